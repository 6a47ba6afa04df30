use std::net::SocketAddr;
use std::time::Duration;

use args::{Args, Command, ServeArgs, TrainArgs};
use clap::Parser;
use tokio_util::sync::CancellationToken;

mod args;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    server::init_logger(&args.log);
    let command = args.command();

    match command {
        Command::Serve(serve_args) => serve(serve_args).await,
        Command::Train(train_args) => {
            let code = train(train_args).await;
            std::process::exit(code);
        }
    }
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let config = config::Config::load(&args.config)?;
    let listen_address = args
        .listen_address
        .or(config.server.listen_address)
        .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 8080)));

    let shutdown_signal = CancellationToken::new();
    let shutdown_for_signal = shutdown_signal.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown_for_signal.cancel();
        }
    });

    server::serve(server::ServeConfig {
        listen_address,
        config,
        shutdown_signal,
        version: env!("CARGO_PKG_VERSION").to_string(),
        bound_addr_sender: None,
    })
    .await?;

    fastrace::flush();
    Ok(())
}

/// Runs one profile's training pass to completion, enforcing the subprocess's
/// outer wall-clock budget around the (synchronous, CPU-bound) training work.
///
/// Returns the process exit code per the exit-code contract: 0 completed,
/// 1 failed (including a blown time budget), 2 lock already held.
async fn train(args: TrainArgs) -> i32 {
    let stale_lock_threshold = Duration::from_secs(args.stale_lock_threshold_secs);
    let budget = Duration::from_secs(args.max_seconds);

    let task = tokio::task::spawn_blocking(move || training::subprocess::run(&args.profiles_root, &args.profile, stale_lock_threshold, args.parent_pid, &args.global_lock_path));

    match tokio::time::timeout(budget, task).await {
        Ok(Ok(Ok(training::subprocess::Outcome::Completed))) => 0,
        Ok(Ok(Ok(training::subprocess::Outcome::LockHeld))) => 2,
        Ok(Ok(Err(err))) => {
            log::error!("training failed: {err}");
            1
        }
        Ok(Err(join_err)) => {
            log::error!("training subprocess task panicked: {join_err}");
            1
        }
        Err(_) => {
            log::error!("training exceeded its {budget:?} time budget, aborting");
            1
        }
    }
}
