fn main() {
    racing_client_lib::run()
}
