fn main() {
    krait::uci::run_uci_loop();
}
