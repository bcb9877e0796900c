fn main() {
    alertcam::run_cli();
}
