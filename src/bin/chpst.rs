fn main() {
    chpst::cli::run()
}
