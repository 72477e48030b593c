fn main() -> anyhow::Result<()> {
    hlsdse::run()
}
