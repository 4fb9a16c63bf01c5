//! Command line definition

use crate::settings::Settings;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use probe_core::observability::LogFormat;
use std::path::PathBuf;

pub(crate) fn command() -> Command {
    Command::new("secret-probe")
        .version(probe_core::VERSION)
        .about("Measure how long a Secret update takes to become visible inside a Pod")
        .long_about(
            "Recreates a Secret and a Pod mounting it, then repeatedly writes the \
             current unix second into the Secret and records when the Pod sees it. \
             One CSV row `now,last_secret_update,last_on_pod` is printed to stdout \
             per observation; diagnostics go to stderr.",
        )
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .value_name("PATH")
                .value_parser(value_parser!(PathBuf))
                .help("TOML settings file; flags override its values"),
        )
        .arg(
            Arg::new("secret")
                .long("secret")
                .value_name("NAME")
                .help("Secret to write [default: my-secret]"),
        )
        .arg(
            Arg::new("key")
                .long("key")
                .value_name("KEY")
                .help("Key inside the Secret [default: time]"),
        )
        .arg(
            Arg::new("pod")
                .long("pod")
                .value_name("NAME")
                .help("Pod that mounts the Secret [default: my-pod]"),
        )
        .arg(
            Arg::new("image")
                .long("image")
                .value_name("IMAGE")
                .help("Pod image; must provide sh, cat and sleep [default: busybox]"),
        )
        .arg(
            Arg::new("namespace")
                .long("namespace")
                .short('n')
                .value_name("NAMESPACE")
                .help("Namespace passed to kubectl"),
        )
        .arg(
            Arg::new("context")
                .long("context")
                .value_name("CONTEXT")
                .help("kubeconfig context passed to kubectl"),
        )
        .arg(
            Arg::new("kubectl")
                .long("kubectl")
                .value_name("PATH")
                .help("kubectl executable [default: kubectl]"),
        )
        .arg(
            Arg::new("poll-interval-ms")
                .long("poll-interval-ms")
                .value_name("MS")
                .value_parser(value_parser!(u64).range(1..))
                .help("How often the Pod re-reads the mounted file [default: 1000]"),
        )
        .arg(
            Arg::new("write-attempts")
                .long("write-attempts")
                .value_name("N")
                .value_parser(value_parser!(u32).range(1..))
                .help("Attempts per Secret write before the cycle is skipped [default: 1]"),
        )
        .arg(
            Arg::new("max-reopens")
                .long("max-reopens")
                .value_name("N")
                .value_parser(value_parser!(u32))
                .help("Times the Pod watch may be restarted after it ends [default: 0]"),
        )
        .arg(
            Arg::new("ready-timeout-secs")
                .long("ready-timeout-secs")
                .value_name("SECS")
                .value_parser(value_parser!(u64).range(1..))
                .help("Limit for the Pod to become Ready"),
        )
        .arg(
            Arg::new("annotate")
                .long("annotate")
                .action(ArgAction::SetTrue)
                .help("Also annotate the Pod with every written value"),
        )
        .arg(
            Arg::new("teardown")
                .long("teardown")
                .action(ArgAction::SetTrue)
                .help("Delete the Pod and the Secret after Ctrl-C"),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .default_value("compact")
                .value_parser(value_parser!(LogFormat))
                .help("Diagnostic format: pretty, compact or json"),
        )
        .arg(
            Arg::new("print-config")
                .long("print-config")
                .action(ArgAction::SetTrue)
                .help("Print the effective settings as TOML and exit"),
        )
}

pub(crate) fn log_format(matches: &ArgMatches) -> LogFormat {
    matches
        .get_one::<LogFormat>("log-format")
        .copied()
        .unwrap_or_default()
}

/// Settings from `--config` (or defaults) with flags applied on top
pub(crate) fn load_settings(matches: &ArgMatches) -> anyhow::Result<Settings> {
    let mut settings = match matches.get_one::<PathBuf>("config") {
        Some(path) => Settings::from_file(path)?,
        None => Settings::default(),
    };
    apply_overrides(matches, &mut settings);
    Ok(settings)
}

fn apply_overrides(matches: &ArgMatches, settings: &mut Settings) {
    let string = |id: &str| matches.get_one::<String>(id).cloned();
    let target = &mut settings.probe.target;

    if let Some(secret) = string("secret") {
        target.secret_name = secret;
    }
    if let Some(key) = string("key") {
        target.secret_key = key;
    }
    if let Some(pod) = string("pod") {
        target.pod_name = pod;
    }
    if let Some(image) = string("image") {
        target.image = image;
    }

    let kubectl = &mut settings.kubectl;
    if let Some(binary) = string("kubectl") {
        kubectl.binary = binary;
    }
    if let Some(namespace) = string("namespace") {
        kubectl.namespace = Some(namespace);
    }
    if let Some(context) = string("context") {
        kubectl.context = Some(context);
    }
    if let Some(secs) = matches.get_one::<u64>("ready-timeout-secs") {
        kubectl.ready_timeout_secs = Some(*secs);
    }

    if let Some(ms) = matches.get_one::<u64>("poll-interval-ms") {
        settings.probe.watch.poll_interval_ms = *ms;
    }
    if let Some(n) = matches.get_one::<u32>("max-reopens") {
        settings.probe.watch.max_reopens = *n;
    }
    if let Some(n) = matches.get_one::<u32>("write-attempts") {
        settings.probe.update.retry = settings.probe.update.retry.with_max_attempts(*n);
    }
    if matches.get_flag("annotate") {
        settings.probe.update.annotate_consumer = true;
    }
    if matches.get_flag("teardown") {
        settings.probe.session.teardown_on_exit = true;
    }
}
