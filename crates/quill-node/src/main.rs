use std::process::ExitCode;

use quill_eyre::eyre::WrapErr as _;
use quill_node::{
    Config,
    Node,
};
use tokio::signal::unix::{
    signal,
    SignalKind,
};
use tracing::{
    error,
    info,
    warn,
};

#[tokio::main]
async fn main() -> ExitCode {
    quill_eyre::install().expect("quill eyre hook must be the first hook installed");

    let cfg: Config = quill_config::get().expect("failed to read configuration");

    let mut telemetry_conf = quill_telemetry::configure()
        .set_filter_directives(&cfg.log)
        .set_force_stdout(cfg.force_stdout)
        .set_pretty_print(cfg.pretty_print);

    if !cfg.no_metrics {
        telemetry_conf =
            telemetry_conf.set_metrics(&cfg.metrics_http_listener_addr, env!("CARGO_PKG_NAME"));
    }

    let _telemetry_guard = match telemetry_conf
        .try_init()
        .wrap_err("failed to setup telemetry")
    {
        Err(e) => {
            eprintln!("initializing quill node failed:\n{e:?}");
            return ExitCode::FAILURE;
        }
        Ok(guard) => guard,
    };

    info!(
        rpc_endpoint = %cfg.rpc_endpoint,
        database_path = %cfg.database_path,
        start_block = cfg.start_block,
        block_lag = cfg.block_lag,
        "initializing quill node"
    );

    let chain_metrics = quill_chain::Metrics::register();
    let indexer_metrics = quill_indexer::Metrics::register();

    let mut sigterm = signal(SignalKind::terminate())
        .expect("setting a SIGTERM listener should always work on Unix");
    let (node, shutdown_handle) = match Node::new(cfg, chain_metrics, indexer_metrics).await {
        Err(error) => {
            error!(%error, "failed initializing quill node");
            return ExitCode::FAILURE;
        }
        Ok(handles) => handles,
    };
    let node_handle = tokio::spawn(node.run());

    let shutdown_token = shutdown_handle.token();
    tokio::select!(
        _ = sigterm.recv() => {
            // We don't care about the result (i.e. whether there could be more SIGTERM signals
            // incoming); we just want to shut down as soon as we receive the first `SIGTERM`.
            info!("received SIGTERM, issuing shutdown to all services");
            shutdown_handle.shutdown();
        }
        () = shutdown_token.cancelled() => {
            warn!("stopped waiting for SIGTERM");
        }
    );

    match node_handle.await {
        Err(error) => error!(%error, "failed to join main node task"),
        Ok(Err(error)) => error!(%error, "node exited with an error"),
        Ok(Ok(())) => {}
    }

    info!("node stopped");
    ExitCode::SUCCESS
}
