mod actions;
mod cli;
mod config;
mod dispatch;
mod error;
mod features;
mod feedback;
mod gestures;
mod ipc;
mod landmarks;
mod logging;
mod session;
mod smoother;

fn main() -> anyhow::Result<()> {
    logging::init();
    cli::run()
}
