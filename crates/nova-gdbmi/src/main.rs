use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use nova_gdbmi::{AttachArgs, ConnectArgs, GdbMiConfig, LoadArgs, Session, SessionEvent};

/// Run a program under GDB's machine interface and print the session events
/// as JSON lines.
///
/// Every line read from stdin is sent to the debugger: lines starting with `-`
/// as MI commands, anything else as a console command.
#[derive(Debug, Parser)]
#[command(name = "nova-gdbmi", version, about)]
struct Cli {
    /// Path to a TOML config file.
    ///
    /// If unset, `NOVA_GDBMI_CONFIG` is used as a fallback. When neither are
    /// provided the defaults are used.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load a program and optionally run it.
    Load {
        /// Working directory for the debugger and the program.
        #[arg(long, default_value = ".")]
        cwd: String,
        /// Arguments for the program, as one string.
        #[arg(long)]
        args: Option<String>,
        /// Terminal to use for the program's stdio.
        #[arg(long)]
        tty: Option<String>,
        /// Start the program once the debugger is ready.
        #[arg(long)]
        run: bool,
        /// Stop at the program's entry point when running.
        #[arg(long, requires = "run")]
        stop_at_entry: bool,
        target: String,
    },
    /// Attach to a process id or an `extended-remote host:port` target.
    Attach {
        #[arg(long, default_value = ".")]
        cwd: String,
        #[arg(long)]
        executable: Option<String>,
        target: String,
    },
    /// Connect to a remote stub such as gdbserver (`host:port`).
    Connect {
        #[arg(long, default_value = ".")]
        cwd: String,
        #[arg(long)]
        executable: Option<String>,
        target: String,
    },
}

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config);
    nova_gdbmi::init_tracing(&config.logging);

    let (session, mut events) = Session::new(config);
    let printer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(event) = events.recv().await {
            let quit = event == SessionEvent::Quit;
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if stdout.write_all(format!("{json}\n").as_bytes()).await.is_err() {
                        break;
                    }
                    let _ = stdout.flush().await;
                }
                Err(err) => tracing::error!(target: "nova.gdbmi", error = %err, "failed to encode event"),
            }
            if quit {
                break;
            }
        }
    });

    let mut run = None;
    let here = std::env::current_dir()?;
    let absolute = |dir: String| here.join(dir).display().to_string();
    match cli.command {
        Command::Load {
            cwd,
            args,
            tty,
            run: start,
            stop_at_entry,
            target,
        } => {
            session
                .load(&LoadArgs {
                    cwd: absolute(cwd),
                    target,
                    program_args: args,
                    tty,
                    autorun: Vec::new(),
                })
                .await?;
            if start {
                run = Some(stop_at_entry);
            }
        }
        Command::Attach {
            cwd,
            executable,
            target,
        } => {
            session
                .attach(&AttachArgs {
                    cwd: absolute(cwd),
                    executable,
                    target,
                    autorun: Vec::new(),
                })
                .await?;
        }
        Command::Connect {
            cwd,
            executable,
            target,
        } => {
            session
                .connect(&ConnectArgs {
                    cwd: absolute(cwd),
                    executable,
                    target,
                    autorun: Vec::new(),
                })
                .await?;
        }
    }

    if let Some(stop_at_entry) = run {
        session.start(stop_at_entry).await?;
    }

    let closed = session.closed_token();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = closed.cancelled() => break,
            line = stdin.next_line() => match line? {
                Some(line) if line.trim().is_empty() => {}
                Some(line) => {
                    if let Err(err) = session.send_user_input(line.trim(), 0, 0).await {
                        eprintln!("nova-gdbmi: {err}");
                    }
                }
                None => {
                    session.stop().await?;
                    break;
                }
            },
        }
    }

    let _ = printer.await;
    Ok(())
}

fn load_config(cli_path: Option<PathBuf>) -> GdbMiConfig {
    let path = cli_path.or_else(|| std::env::var_os("NOVA_GDBMI_CONFIG").map(PathBuf::from));
    let Some(path) = path else {
        return GdbMiConfig::default();
    };

    match GdbMiConfig::load_from_path(&path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!(
                "nova-gdbmi: failed to load config from {}: {err}; continuing with defaults",
                path.display()
            );
            GdbMiConfig::default()
        }
    }
}
