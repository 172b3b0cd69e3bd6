use clap::CommandFactory;
use clap::Parser;
use clap_complete::generate;

use viewserver::commands::Cli;
use viewserver::commands::Commands;
use viewserver::commands::ServerCommand;
use viewserver::error::ErrorReport;
use viewserver::handlers;
use viewserver::handlers::HandlerContext;
use viewserver::handlers::NodeAction;
use viewserver::presenter::Presenter;
use viewserver::presenter::create_presenter;
use viewserver::telemetry::init_tracing;
use viewserver_common::color_init;
use viewserver_ipc::ClientConfig;
use viewserver_ipc::DeviceBridge;

fn main() {
    let cli = Cli::parse();
    color_init(cli.no_color);
    let presenter: Box<dyn Presenter> = create_presenter(cli.effective_format());

    if let Err(e) = run(cli) {
        let report = ErrorReport::from_error(e.as_ref());
        presenter.present_error_report(&report);
        std::process::exit(report.exit_code());
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let _telemetry = init_tracing(cli.verbose);

    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        generate(*shell, &mut cmd, "viewserver", &mut std::io::stdout());
        return Ok(());
    }

    let format = cli.effective_format();
    let bridge = DeviceBridge::new(ClientConfig::from_env());
    let ctx = HandlerContext::new(bridge, cli.adb, cli.serial, format);

    let result = match cli.command {
        Commands::Completions { .. } => unreachable!(),

        Commands::Devices => handlers::handle_devices(&ctx),
        Commands::Server(ServerCommand::Status) => handlers::handle_server_status(&ctx),
        Commands::Server(ServerCommand::Start { port }) => {
            handlers::handle_server_start(&ctx, port)
        }
        Commands::Server(ServerCommand::Stop) => handlers::handle_server_stop(&ctx),
        Commands::Windows => handlers::handle_windows(&ctx),
        Commands::Focus => handlers::handle_focus(&ctx),
        Commands::Dump {
            window,
            profile,
            filter,
        } => handlers::handle_dump(&ctx, window, profile, filter),
        Commands::Profile { window } => handlers::handle_profile(&ctx, window),
        Commands::Invalidate { window, node } => {
            handlers::handle_node_command(&ctx, NodeAction::Invalidate, window, node)
        }
        Commands::Relayout { window, node } => {
            handlers::handle_node_command(&ctx, NodeAction::RequestLayout, window, node)
        }
        Commands::Watch => handlers::handle_watch(&ctx),
    };

    ctx.bridge.shutdown();
    result
}
