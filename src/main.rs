use discovery_cli::run;

fn main() -> anyhow::Result<()> {
    let code = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run())?;

    std::process::exit(code)
}
