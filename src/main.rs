use anyhow::Result;
use clap::Parser;
use std::io::Write;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use voxflow::audio::list_input_devices;
use voxflow::cli::{Cli, Commands};
use voxflow::config::Config;
use voxflow::session::{SessionMode, VoiceSession};
use voxflow::transcription::server::UpdateCallback;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let path = cli.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_default(&path)?.with_env_overrides();
    if let Some(language) = cli.language.clone() {
        config.voice.language = Some(language);
    }

    match cli.command {
        None | Some(Commands::Listen) => run_session(config, SessionMode::PushToTalk).await,
        Some(Commands::Stream) => run_session(config, SessionMode::Continuous).await,
        Some(Commands::Devices) => list_devices(),
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run_session(config: Config, mode: SessionMode) -> Result<()> {
    if !config.voice.enabled {
        eprintln!("voice capture is disabled in the configuration");
        return Ok(());
    }

    let session = VoiceSession::build(&config, mode, transcript_printer())?;

    match mode {
        SessionMode::PushToTalk => {
            eprintln!("hold the push-to-talk key to record; Ctrl-C to exit");
            session.run_push_to_talk(wait_for_ctrl_c()).await?;
        }
        SessionMode::Continuous => {
            eprintln!("listening; Ctrl-C to exit");
            session.run_continuous(wait_for_ctrl_c()).await?;
        }
    }

    session.close().await?;
    Ok(())
}

async fn wait_for_ctrl_c() {
    let _ = tokio::signal::ctrl_c().await;
}

/// Print each transcript update on its own line, marking interim results.
fn transcript_printer() -> UpdateCallback {
    Arc::new(|text, is_processing| {
        if text.is_empty() {
            return;
        }
        let mut stdout = std::io::stdout().lock();
        let marker = if is_processing { " …" } else { "" };
        let _ = writeln!(stdout, "{}{}", text, marker);
        let _ = stdout.flush();
    })
}

fn list_devices() -> Result<()> {
    let devices = list_input_devices()?;
    if devices.is_empty() {
        eprintln!("no usable input devices found");
        return Ok(());
    }
    for name in devices {
        println!("{}", name);
    }
    Ok(())
}
