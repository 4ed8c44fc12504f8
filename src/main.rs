fn main() -> anyhow::Result<()> {
    brrtkit::cli::run_cli()
}
