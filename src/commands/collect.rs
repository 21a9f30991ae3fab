//! `syscheck collect`: connect to one host, run its manifest and render the report.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use colored::Colorize;
use secrecy::SecretString;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::connector::{Connector, SshAuth, SshConnector, WinRmConnector};
use crate::domain::{CollectObserver, Collector, Outcome};
use crate::platform::Platform;
use crate::profile::{Profile, ProfileStore};
use crate::prompt::{NoPrompt, Prompter, Terminal};
use crate::render::{self, OutputFormat};

/// Environment variable consulted for the SSH / WinRM password before prompting.
pub const PASSWORD_ENV: &str = "SYSCHECK_PASSWORD";

#[derive(Debug, Clone, Default, clap::Args)]
pub struct CollectArgs {
    /// Target hostname or IP address
    #[arg(long)]
    pub host: Option<String>,

    /// Username to connect with
    #[arg(short, long)]
    pub user: Option<String>,

    /// Target platform (windows, rhel, rocky, almalinux, fedora, debian, ubuntu)
    #[arg(long)]
    pub os: Option<String>,

    /// SSH private key for the connection
    #[arg(long)]
    pub key: Option<String>,

    /// Windows domain for the account
    #[arg(long)]
    pub domain: Option<String>,

    /// Override the SSH / WinRM port
    #[arg(long)]
    pub port: Option<u16>,

    /// Extra service patterns, wildcards allowed (e.g. '*sql*' nginx)
    #[arg(long, num_args = 1.., value_delimiter = ',')]
    pub services: Vec<String>,

    /// Report format
    #[arg(short, long, value_enum)]
    pub output: Option<OutputFormat>,

    /// Where to write the HTML report (default: a temporary file)
    #[arg(long)]
    pub output_file: Option<PathBuf>,

    /// Do not open the HTML report in a browser
    #[arg(long)]
    pub no_open: bool,

    /// Load connection settings from a saved profile
    #[arg(long)]
    pub profile: Option<String>,

    /// Save the effective connection settings under this profile name
    #[arg(long)]
    pub save_profile: Option<String>,

    /// Fail instead of prompting for missing values
    #[arg(long)]
    pub no_prompt: bool,

    /// Suppress progress output
    #[arg(short, long)]
    pub quiet: bool,
}

/// Everything needed to run a collection, after merging flags, profile and prompts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub user: String,
    pub platform: Platform,
    pub key: Option<String>,
    pub domain: Option<String>,
    pub services: Vec<String>,
    pub output: OutputFormat,
}

impl Target {
    pub fn to_profile(&self) -> Profile {
        Profile {
            host: Some(self.host.clone()),
            user: Some(self.user.clone()),
            os: Some(self.platform.to_string()),
            key: self.key.clone(),
            domain: self.domain.clone(),
            output: Some(self.output),
            services: self.services.clone(),
        }
    }
}

/// Merge flags over the profile, prompting for whatever is still missing.
pub fn resolve(
    args: &CollectArgs,
    profile: Profile,
    default_output: OutputFormat,
    prompter: &mut dyn Prompter,
) -> Result<Target> {
    let host = match args.host.clone().or(profile.host) {
        Some(host) => host,
        None => prompter.ask("Host")?,
    };
    let user = match args.user.clone().or(profile.user) {
        Some(user) => user,
        None => prompter.ask("username")?,
    };
    let os = match args.os.clone().or(profile.os) {
        Some(os) => os,
        None => prompter.ask(&format!("OS ({})", Platform::supported()))?,
    };
    let platform: Platform = os.parse()?;

    let domain = match args.domain.clone().or(profile.domain) {
        Some(domain) => Some(domain),
        None if platform.is_windows() => prompter.ask_optional("Domain (blank for none)")?,
        None => None,
    };

    let services = if args.services.is_empty() {
        profile.services
    } else {
        args.services.clone()
    };

    Ok(Target {
        host,
        user,
        platform,
        key: args.key.clone().or(profile.key),
        domain,
        services,
        output: args.output.or(profile.output).unwrap_or(default_output),
    })
}

fn password_from_env() -> Option<SecretString> {
    std::env::var(PASSWORD_ENV)
        .ok()
        .filter(|p| !p.is_empty())
        .map(SecretString::from)
}

fn build_connector(
    target: &Target,
    config: &Config,
    port: Option<u16>,
    interactive: bool,
    prompter: &mut dyn Prompter,
) -> Result<Box<dyn Connector>> {
    if target.platform.is_windows() {
        let password = match password_from_env() {
            Some(p) => p,
            None => prompter.password("Enter WinRM Password")?,
        };
        let connector = WinRmConnector::new(
            &target.host,
            &target.user,
            target.domain.as_deref(),
            password,
            config.winrm.to_options(port),
        );
        return Ok(Box::new(connector));
    }

    let auth = if let Some(key) = &target.key {
        SshAuth::Key(PathBuf::from(key))
    } else if let Some(password) = password_from_env() {
        SshAuth::Password(password)
    } else if interactive {
        SshAuth::Password(prompter.password("Enter SSH Password")?)
    } else {
        debug!("no key or password available, relying on ssh-agent");
        SshAuth::Agent
    };

    let connector = SshConnector::new(&target.host, &target.user, auth, config.ssh.to_options(port))?;
    Ok(Box::new(connector))
}

/// Prints an `ok` or `!!` line per finished metric on stderr.
struct Progress;

fn finished_line(name: &str, outcome: &Outcome) -> String {
    match outcome {
        Ok(_) => format!("{} {}", "ok".green().bold(), name),
        Err(failure) => format!("{} {} ({})", "!!".red().bold(), name, failure.cause),
    }
}

impl CollectObserver for Progress {
    fn metric_finished(&self, name: &str, outcome: &Outcome) {
        eprintln!("{}", finished_line(name, outcome));
    }

    fn services_discovered(&self, available: usize, matched: usize) {
        eprintln!(
            "{} {matched} of {available} services match the patterns",
            "::".blue().bold()
        );
    }
}

pub fn run(args: CollectArgs, config: &Config) -> Result<()> {
    let store = ProfileStore::new(config.profile_dir()?);
    let profile = match &args.profile {
        Some(name) => store
            .load(name)
            .with_context(|| format!("loading profile '{name}'"))?,
        None => Profile::default(),
    };

    let interactive = !args.no_prompt && Terminal::is_interactive();
    let mut prompter: Box<dyn Prompter> = if interactive {
        Box::new(Terminal)
    } else {
        Box::new(NoPrompt)
    };

    let target = resolve(&args, profile, config.output, prompter.as_mut())?;

    if let Some(name) = &args.save_profile {
        let path = store
            .save(name, &target.to_profile())
            .with_context(|| format!("saving profile '{name}'"))?;
        eprintln!("{} Saved profile {} to {}", "ok".green().bold(), name.bold(), path.display());
    }

    let collector = Collector::for_platform(target.platform, target.services.clone());
    let mut connector = build_connector(&target, config, args.port, interactive, prompter.as_mut())?;

    let show_progress = !args.quiet && target.output != OutputFormat::Json;
    if show_progress {
        eprintln!(
            "{} Connecting to {} as {} ({})",
            "::".blue().bold(),
            target.host.bold(),
            target.user,
            connector.name()
        );
    }
    info!(host = %target.host, platform = %target.platform, via = connector.name(), "connecting");

    connector
        .connect()
        .with_context(|| format!("connecting to {} as {}", target.host, target.user))?;

    let result = if show_progress {
        collector.collect_with(&connector, &Progress)
    } else {
        collector.collect(&connector)
    };
    connector.close();
    let report = result.with_context(|| format!("collecting from {}", target.host))?;

    let failed = report.failures().count();
    if failed > 0 {
        warn!(host = %target.host, failed, "some metrics could not be collected");
    }

    match target.output {
        OutputFormat::Text => print!("{}", render::text::render(&report, &target.host)),
        OutputFormat::Json => {
            println!("{}", render::json::render(&report).context("serializing report")?)
        }
        OutputFormat::Html => {
            let html = render::html::render(&report, &target.host, Utc::now());
            let path = render::html::write_report(&html, args.output_file.as_deref())?;
            eprintln!("{} HTML report written to {}", "ok".green().bold(), path.display());
            if !args.no_open {
                if let Err(e) = render::html::open_in_browser(&path) {
                    warn!(error = %e, "could not open browser");
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::error::CollectError;

    /// Answers prompts from a queue and records the labels it was asked.
    #[derive(Default)]
    struct Scripted {
        answers: VecDeque<&'static str>,
        asked: Vec<String>,
    }

    impl Scripted {
        fn new(answers: &[&'static str]) -> Self {
            Self {
                answers: answers.iter().copied().collect(),
                asked: Vec::new(),
            }
        }
    }

    impl Prompter for Scripted {
        fn ask(&mut self, label: &str) -> Result<String> {
            self.asked.push(label.to_string());
            Ok(self.answers.pop_front().unwrap_or("").to_string())
        }

        fn ask_optional(&mut self, label: &str) -> Result<Option<String>> {
            self.asked.push(label.to_string());
            Ok(self.answers.pop_front().map(String::from))
        }

        fn password(&mut self, label: &str) -> Result<SecretString> {
            self.asked.push(label.to_string());
            Ok(SecretString::from("fakepassword"))
        }
    }

    #[test]
    fn prompts_for_linux_required_inputs() {
        let mut prompter = Scripted::new(&["example.com", "testuser", "rhel"]);
        let target = resolve(
            &CollectArgs::default(),
            Profile::default(),
            OutputFormat::Text,
            &mut prompter,
        )
        .unwrap();

        assert_eq!(target.host, "example.com");
        assert_eq!(target.user, "testuser");
        assert_eq!(target.platform, Platform::Rhel);
        assert_eq!(target.domain, None);
        assert!(prompter.asked[0].contains("Host"));
        assert!(prompter.asked[1].contains("username"));
        assert!(prompter.asked[2].contains("OS"));
        assert_eq!(prompter.asked.len(), 3);
    }

    #[test]
    fn prompts_for_windows_domain() {
        let mut prompter = Scripted::new(&["example.com", "testuser", "windows", "ACMECORP"]);
        let target = resolve(
            &CollectArgs::default(),
            Profile::default(),
            OutputFormat::Text,
            &mut prompter,
        )
        .unwrap();

        assert_eq!(target.platform, Platform::Windows);
        assert_eq!(target.domain.as_deref(), Some("ACMECORP"));
        assert!(prompter.asked[3].contains("Domain"));
    }

    #[test]
    fn flags_beat_profile_and_skip_prompts() {
        let args = CollectArgs {
            host: Some("flag.example".into()),
            services: vec!["*docker*".into()],
            output: Some(OutputFormat::Json),
            ..CollectArgs::default()
        };
        let profile = Profile {
            host: Some("profile.example".into()),
            user: Some("root".into()),
            os: Some("ubuntu".into()),
            services: vec!["httpd".into()],
            output: Some(OutputFormat::Html),
            ..Profile::default()
        };
        let mut prompter = Scripted::default();
        let target = resolve(&args, profile, OutputFormat::Text, &mut prompter).unwrap();

        assert_eq!(target.host, "flag.example");
        assert_eq!(target.user, "root");
        assert_eq!(target.platform, Platform::Ubuntu);
        assert_eq!(target.services, ["*docker*"]);
        assert_eq!(target.output, OutputFormat::Json);
        assert!(prompter.asked.is_empty());
    }

    #[test]
    fn profile_services_used_when_no_flags() {
        let profile = Profile {
            host: Some("h".into()),
            user: Some("u".into()),
            os: Some("debian".into()),
            services: vec!["httpd".into(), "sshd".into()],
            ..Profile::default()
        };
        let target = resolve(
            &CollectArgs::default(),
            profile,
            OutputFormat::Html,
            &mut NoPrompt,
        )
        .unwrap();
        assert_eq!(target.services, ["httpd", "sshd"]);
        assert_eq!(target.output, OutputFormat::Html);
    }

    #[test]
    fn missing_values_fail_without_prompting() {
        let err = resolve(
            &CollectArgs::default(),
            Profile::default(),
            OutputFormat::Text,
            &mut NoPrompt,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Host is required"));
    }

    #[test]
    fn unsupported_os_surfaces_as_collect_error() {
        let args = CollectArgs {
            host: Some("h".into()),
            user: Some("u".into()),
            os: Some("solaris".into()),
            ..CollectArgs::default()
        };
        let err = resolve(&args, Profile::default(), OutputFormat::Text, &mut NoPrompt).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CollectError>(),
            Some(CollectError::UnsupportedPlatform(_))
        ));
    }

    #[test]
    fn target_round_trips_through_a_profile() {
        let target = Target {
            host: "acme.com".into(),
            user: "root".into(),
            platform: Platform::Ubuntu,
            key: Some("~/.ssh/id_ed25519".into()),
            domain: None,
            services: vec!["httpd".into()],
            output: OutputFormat::Text,
        };
        let reparsed = Profile::parse(&target.to_profile().to_file_string());
        let again = resolve(&CollectArgs::default(), reparsed, OutputFormat::Json, &mut NoPrompt).unwrap();
        assert_eq!(again, target);
    }

    #[test]
    fn progress_lines_mark_success_and_failure() {
        use crate::domain::report::{MetricFailure, MetricValue};

        let ok = finished_line("Hostname", &Ok(MetricValue::Scalar("web01".into())));
        assert!(ok.contains("ok"));
        assert!(ok.ends_with("Hostname"));

        let failed = finished_line("Kernel", &Err(MetricFailure::new("Kernel", "timed out")));
        assert!(failed.contains("!!"));
        assert!(failed.contains("Kernel"));
        assert!(failed.ends_with("(timed out)"));
    }
}
