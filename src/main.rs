fn main() -> anyhow::Result<()> {
    decklist_scanner_lib::run()
}
