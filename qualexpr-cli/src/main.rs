fn main() -> anyhow::Result<()> {
    qualexpr_cli::run()
}
