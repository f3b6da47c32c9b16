// SPDX-FileCopyrightText: © 2024 The remotefn authors
// SPDX-License-Identifier: MIT
use clap::Parser;

#[derive(Debug, clap::Parser)]
#[command(long_about = None)]
struct Args {
    #[arg(short, long, default_value_t = String::from("agent.toml"))]
    config_file: String,
    #[arg(short, long, default_value_t = String::from(""))]
    template: String,
}

fn read_conf_from_file(filename: &str) -> anyhow::Result<remotefn_agent::RemoteFnAgentSettings> {
    Ok(toml::from_str::<remotefn_agent::RemoteFnAgentSettings>(
        &std::fs::read_to_string(filename)?,
    )?)
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();

    // Create a template agent configuration and exit.
    if !args.template.is_empty() {
        remotefn_api::util::create_template(&args.template, remotefn_agent::remotefn_agent_default_conf().as_str())?;
        return Ok(());
    }

    let conf = read_conf_from_file(&args.config_file)?;

    let async_runtime = tokio::runtime::Builder::new_multi_thread().worker_threads(8).enable_all().build()?;
    let async_tasks = vec![async_runtime.spawn(remotefn_agent::remotefn_agent_main(conf))];

    async_runtime.block_on(async { futures::future::join_all(async_tasks).await });
    Ok(())
}
