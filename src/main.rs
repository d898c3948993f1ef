use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

/// Logs filesystem changes under the paths of a watch list
#[derive(Parser, Debug)]
#[command(name = "inotify-watch", version, about)]
struct Args {
    /// Watch list, one absolute path per line
    #[arg(short = 'f', long = "config", default_value = "/etc/inotify-watch.conf")]
    config: PathBuf,

    /// File records are appended to
    #[arg(short, long, default_value = "/var/log/inotify-watch.log")]
    log_file: PathBuf,

    /// Write the process id to this file while running
    #[arg(short, long)]
    pid_file: Option<PathBuf>,

    /// Do not send records to syslog
    #[arg(short = 's', long)]
    no_syslog: bool,

    /// Do not echo records to stdout
    #[arg(short, long)]
    quiet: bool,

    /// Also watch the subdirectories present when a directory is registered
    #[arg(short, long)]
    recursive: bool,

    /// Do not fingerprint modified files
    #[arg(long)]
    no_fingerprint: bool,

    /// Bytes read at most from one file to fingerprint it
    #[arg(long, default_value_t = 16 * 1024 * 1024)]
    max_fingerprint_bytes: u64,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    match daemon::run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
mod daemon {
    use super::Args;
    use inotify_watch::{
        Config, Dispatcher, Error, EventLoop, FanOut, FileSink, InotifySource, LoopHandle, Result,
        StdoutSink, SyslogSink, WatchList,
    };
    use std::path::{Path, PathBuf};
    use std::{fs, io, mem, process, ptr, thread};

    const NAME: &str = env!("CARGO_PKG_NAME");
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    pub fn run(args: Args) -> Result<()> {
        // before any thread is spawned, so every thread inherits the mask
        let signals = block_signals()?;

        let watch_list = WatchList::load(&args.config)?;
        let config = Config::default()
            .with_recursive(args.recursive)
            .with_fingerprints(!args.no_fingerprint)
            .with_max_fingerprint_bytes(args.max_fingerprint_bytes);

        let mut sink = FanOut::new().with(FileSink::new(&args.log_file));
        if !args.no_syslog {
            sink = sink.with(SyslogSink::open(NAME));
        }
        if !args.quiet {
            sink = sink.with(StdoutSink);
        }

        let dispatcher = Dispatcher::new(&config, None, sink);
        let mut event_loop = EventLoop::new(InotifySource::init()?, dispatcher)?;
        event_loop.note(&format!("{NAME} {VERSION} started. PID {}", process::id()));

        for path in watch_list.paths() {
            if let Err(err) = event_loop.watch(path) {
                log::warn!("{err}");
            }
        }
        if event_loop.registry().is_empty() {
            log::warn!("no path from {} is watched", args.config.display());
        } else {
            log::info!("watching {} paths", event_loop.registry().len());
        }

        if let Some(ref pid_file) = args.pid_file {
            fs::write(pid_file, format!("{}\n", process::id()))
                .map_err(|err| Error::io(err).add_path(pid_file.clone()))?;
        }

        spawn_signal_thread(signals, event_loop.handle(), args.config.clone(), watch_list)?;
        let result = event_loop.run();

        if let Some(ref pid_file) = args.pid_file {
            if let Err(err) = fs::remove_file(pid_file) {
                log::warn!("unable to remove {}: {err}", pid_file.display());
            }
        }
        log::info!("{NAME} stopped");
        result
    }

    fn block_signals() -> io::Result<libc::sigset_t> {
        let mut set: libc::sigset_t = unsafe { mem::zeroed() };
        unsafe {
            libc::sigemptyset(&mut set);
            for signal in [libc::SIGINT, libc::SIGTERM, libc::SIGHUP] {
                libc::sigaddset(&mut set, signal);
            }
        }
        let rc = unsafe { libc::pthread_sigmask(libc::SIG_BLOCK, &set, ptr::null_mut()) };
        if rc != 0 {
            return Err(io::Error::from_raw_os_error(rc));
        }
        Ok(set)
    }

    fn wait_signal(set: &libc::sigset_t) -> io::Result<libc::c_int> {
        let mut signal = 0;
        let rc = unsafe { libc::sigwait(set, &mut signal) };
        if rc != 0 {
            return Err(io::Error::from_raw_os_error(rc));
        }
        Ok(signal)
    }

    /// SIGHUP reloads the watch list, SIGINT and SIGTERM stop the loop.
    fn spawn_signal_thread(
        signals: libc::sigset_t,
        handle: LoopHandle,
        config: PathBuf,
        mut watch_list: WatchList,
    ) -> io::Result<()> {
        thread::Builder::new()
            .name("inotify-watch signals".to_string())
            .spawn(move || loop {
                match wait_signal(&signals) {
                    Ok(libc::SIGHUP) => reload(&handle, &config, &mut watch_list),
                    Ok(signal) => {
                        log::info!("received signal {signal}, stopping");
                        if let Err(err) = handle.shutdown() {
                            log::error!("{err}");
                        }
                        break;
                    }
                    Err(err) => {
                        log::error!("sigwait failed: {err}");
                        break;
                    }
                }
            })?;
        Ok(())
    }

    fn reload(handle: &LoopHandle, config: &Path, current: &mut WatchList) {
        let list = match WatchList::load(config) {
            Ok(list) => list,
            Err(err) => {
                log::error!("{err}");
                return;
            }
        };

        for path in current.paths().iter().filter(|p| !list.paths().contains(p)) {
            if let Err(err) = handle.remove_watch(path) {
                log::warn!("{err}");
            }
        }
        for path in list.paths() {
            if let Err(err) = handle.add_watch(path) {
                log::warn!("{err}");
            }
        }
        log::info!("watch list reloaded from {}", config.display());
        *current = list;
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
mod daemon {
    use super::Args;
    use inotify_watch::{Error, Result};
    use std::io;

    pub fn run(_args: Args) -> Result<()> {
        Err(Error::io(io::Error::new(
            io::ErrorKind::Unsupported,
            "inotify is only available on Linux",
        )))
    }
}
