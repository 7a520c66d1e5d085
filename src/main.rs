use clap::Parser;

mod commands;
mod output;
mod tty;

use commands::deploy;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "bpb-wizard")]
#[command(version = VERSION)]
#[command(about = "Provision a BPB panel on Cloudflare Workers or Pages")]
struct Cli {
    #[command(flatten)]
    deploy: deploy::DeployArgs,
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let (json_result, exit_code) = output::map_cmd_result_to_json(deploy::run(cli.deploy));

    if let Err(err) = output::print_json_result(json_result) {
        eprintln!("{}", err.message);
        return std::process::ExitCode::from(1);
    }

    std::process::ExitCode::from(exit_code_to_u8(exit_code))
}

fn exit_code_to_u8(code: i32) -> u8 {
    if code <= 0 {
        0
    } else if code >= 255 {
        255
    } else {
        code as u8
    }
}
