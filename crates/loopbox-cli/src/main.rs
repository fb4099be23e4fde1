//! loopbox CLI - drive one sandboxed mount attempt from the command line.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};

use loopbox_sandbox::{mount_image, run_worker, ImageSegment, MountRequest, SandboxConfig};

#[derive(Parser)]
#[command(name = "loopbox")]
#[command(author, version, about = "Mount synthetic filesystem images inside a sandboxed worker")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mount an image file at a target directory inside a sandboxed worker
    Mount {
        /// Filesystem image staged behind the loop device
        image: PathBuf,

        /// Mount target directory (created if absent)
        target: PathBuf,

        /// Filesystem type
        #[arg(short, long, default_value = "ext4")]
        fstype: String,

        /// Raw mount options, comma separated
        #[arg(short, long, default_value = "")]
        options: String,

        /// Worker id; selects /dev/loop<id>
        #[arg(short, long, default_value = "0")]
        worker: u32,

        /// Mount read-only
        #[arg(long)]
        read_only: bool,

        /// Abort instead of warn when a sandbox setup step fails
        #[arg(long)]
        strict: bool,
    },

    /// Verify the host supports the harness
    Check,
}

fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("loopbox_cli=info".parse()?)
                .add_directive("loopbox_sandbox=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Mount {
            image,
            target,
            fstype,
            options,
            worker,
            read_only,
            strict,
        } => {
            let data = fs::read(&image)
                .with_context(|| format!("reading image {}", image.display()))?;

            let mut config = SandboxConfig::default();
            if strict {
                config = config.abort_on_failure();
            }

            let flags = if read_only { libc::MS_RDONLY } else { 0 };
            let status = run_worker(&config, worker, |worker| {
                let request = MountRequest {
                    fstype: &fstype,
                    target: &target,
                    size: data.len() as u64,
                    segments: Some(vec![ImageSegment {
                        data: &data,
                        size: data.len() as u64,
                        offset: 0,
                    }]),
                    flags,
                    options: &options,
                };
                match mount_image(request, worker) {
                    Ok(_dir) => {
                        tracing::info!(path = %target.display(), "mounted");
                        0
                    }
                    Err(err) => {
                        tracing::error!(%err, "mount attempt failed");
                        err.errno().raw_os_error()
                    }
                }
            })?;

            Ok(ExitCode::from(status.clamp(0, 255) as u8))
        }

        Commands::Check => match loopbox_sys::check() {
            Ok(info) => {
                let (major, minor, patch) = info.kernel_version;
                println!("kernel: {major}.{minor}.{patch}");
                println!("memfd_create: ok");
                println!("loop-control: ok");
                Ok(ExitCode::SUCCESS)
            }
            Err(err) => {
                eprintln!("system check failed: {err}");
                Ok(ExitCode::FAILURE)
            }
        },
    }
}
