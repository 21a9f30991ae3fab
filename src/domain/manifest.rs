//! Command manifests: the ordered table of diagnostics run for a platform,
//! plus the hooks the service pass needs (listing command, name suffix,
//! per-service status command, default patterns).
//!
//! Linux distributions share one manifest and differ only in the command
//! behind "Last Update".

use std::collections::BTreeSet;

use serde::Serialize;

use crate::platform::{Family, PackageFamily, Platform};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Metric {
    pub name: &'static str,
    pub command: String,
}

impl Metric {
    pub fn new(name: &'static str, command: impl Into<String>) -> Self {
        Self {
            name,
            command: command.into(),
        }
    }
}

/// How a service's status is queried on the remote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusQuery {
    /// `systemctl is-active <unit>`
    Systemctl,
    /// `(Get-Service -Name '<name>').Status`
    PowerShell,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceProbe {
    pub list_command: &'static str,
    pub suffix: Option<&'static str>,
    pub status: StatusQuery,
    pub default_patterns: &'static [&'static str],
}

const LINUX_DEFAULT_PATTERNS: &[&str] = &[
    "*ssh*",
    "*http*",
    "*nginx*",
    "*sql*",
    "*mariadb*",
    "*mysql*",
    "*postgres*",
    "*firewalld*",
    "*sshd*",
];

const WINDOWS_DEFAULT_PATTERNS: &[&str] = &[
    "*SQL*",
    "*IIS*",
    "*HTTP*",
    "*DNS*",
    "*DHCP*",
    "*WinDefend*",
    "*Firewall*",
];

impl ServiceProbe {
    pub fn systemd() -> Self {
        Self {
            list_command: "systemctl list-units --type=service --no-pager --no-legend --plain",
            suffix: Some(".service"),
            status: StatusQuery::Systemctl,
            default_patterns: LINUX_DEFAULT_PATTERNS,
        }
    }

    pub fn windows() -> Self {
        Self {
            list_command: "Get-Service | Select-Object -ExpandProperty Name",
            suffix: None,
            status: StatusQuery::PowerShell,
            default_patterns: WINDOWS_DEFAULT_PATTERNS,
        }
    }

    pub fn status_command(&self, service: &str) -> String {
        match self.status {
            StatusQuery::Systemctl => format!("systemctl is-active {}", shell_quote(service)),
            StatusQuery::PowerShell => format!(
                "(Get-Service -Name '{}').Status",
                service.replace('\'', "''")
            ),
        }
    }

    /// Service identifiers from the listing output: first token of each
    /// line, platform suffix stripped.
    pub fn identifiers(&self, listing: &str) -> BTreeSet<String> {
        listing
            .lines()
            .filter_map(|line| {
                let token = line.split_whitespace().next()?;
                let name = match self.suffix {
                    Some(suffix) => token.strip_suffix(suffix).unwrap_or(token),
                    None => token,
                };
                (!name.is_empty()).then(|| name.to_string())
            })
            .collect()
    }
}

/// Single-quote for a POSIX shell unless the word is plainly safe.
fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_.@:+".contains(c));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    platform: Platform,
    metrics: Vec<Metric>,
    services: ServiceProbe,
}

impl Manifest {
    pub fn new(platform: Platform, metrics: Vec<Metric>, services: ServiceProbe) -> Self {
        Self {
            platform,
            metrics,
            services,
        }
    }

    pub fn for_platform(platform: Platform) -> Self {
        match platform.family() {
            Family::Linux(packages) => Self::new(platform, linux_metrics(packages), ServiceProbe::systemd()),
            Family::Windows => Self::new(platform, windows_metrics(), ServiceProbe::windows()),
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn metrics(&self) -> &[Metric] {
        &self.metrics
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.metrics.iter().map(|m| m.name)
    }

    pub fn services(&self) -> &ServiceProbe {
        &self.services
    }
}

fn last_update_command(packages: PackageFamily) -> &'static str {
    match packages {
        PackageFamily::Rpm => "stat -c %y /var/log/dnf.rpm.log",
        PackageFamily::Apt => "stat -c %y /var/log/apt/history.log",
    }
}

fn linux_metrics(packages: PackageFamily) -> Vec<Metric> {
    vec![
        Metric::new("Hostname", "hostname"),
        Metric::new("Uptime", "uptime -p"),
        Metric::new(
            "OS Version",
            r#"grep '^PRETTY_NAME=' /etc/os-release | cut -d= -f2 | tr -d '"'"#,
        ),
        Metric::new("Kernel", "uname -r"),
        Metric::new(
            "CPU Usage",
            r#"top -bn1 | grep "Cpu(s)" | awk '{print $2 + $4 "% used"}'"#,
        ),
        Metric::new(
            "Memory Usage",
            r#"free | awk '/Mem:/ { printf("%.2f%% used\n", $3/$2 * 100) }'"#,
        ),
        Metric::new(
            "Swap Usage",
            r#"free | awk '/Swap:/ { if ($2 > 0) printf("%.2f%% used\n", $3/$2 * 100); else print "no swap configured" }'"#,
        ),
        Metric::new("Last Update", last_update_command(packages)),
        Metric::new("TimeZone", "timedatectl show -p Timezone --value"),
        Metric::new("SELinux Status", "getenforce"),
        Metric::new("Disk Usage", "df -h --output=source,size,used,avail,pcent,target"),
        Metric::new("Last 10 Journalctl Errors", "journalctl -p 3 -n 10 --no-pager"),
    ]
}

fn windows_metrics() -> Vec<Metric> {
    vec![
        Metric::new("Hostname", "hostname"),
        Metric::new(
            "Uptime",
            r#"$u = (Get-Date) - (Get-CimInstance Win32_OperatingSystem).LastBootUpTime; "up {0} days, {1} hours, {2} minutes" -f $u.Days, $u.Hours, $u.Minutes"#,
        ),
        Metric::new("OS Version", "(Get-CimInstance Win32_OperatingSystem).Caption"),
        Metric::new("Build", "(Get-CimInstance Win32_OperatingSystem).Version"),
        Metric::new(
            "CPU Usage",
            r#"$cpu = Get-Counter '\Processor(_Total)\% Processor Time' -SampleInterval 1 -MaxSamples 2; "{0} %" -f [math]::Round(($cpu.CounterSamples | Select-Object -ExpandProperty CookedValue | Measure-Object -Average).Average, 2)"#,
        ),
        Metric::new(
            "Memory Usage",
            r#"Get-CimInstance Win32_OperatingSystem | ForEach-Object { "{0:N2}% used" -f ((($_.TotalVisibleMemorySize - $_.FreePhysicalMemory) / $_.TotalVisibleMemorySize) * 100) }"#,
        ),
        Metric::new(
            "Swap Usage",
            r#"Get-CimInstance Win32_PageFileUsage | ForEach-Object { "{0:N2}% used" -f (($_.CurrentUsage / $_.AllocatedBaseSize) * 100) }"#,
        ),
        Metric::new(
            "Last Windows Update",
            "Get-HotFix | Sort-Object InstalledOn -Descending | Select-Object -First 1 -ExpandProperty InstalledOn",
        ),
        Metric::new("TimeZone", "(Get-TimeZone).Id"),
        Metric::new(
            "Windows Defender Enabled",
            "Get-MpComputerStatus | Select-Object -ExpandProperty AMServiceEnabled",
        ),
        Metric::new(
            "Disk Usage",
            r#"Get-PSDrive -PSProvider 'FileSystem' | ForEach-Object { "{0}: Used: {1} GB Free: {2} GB" -f $_.Name, [int]($_.Used / 1GB), [int]($_.Free / 1GB) }"#,
        ),
        Metric::new(
            "Last 10 System Errors",
            "Get-EventLog -LogName System -EntryType Error -Newest 10 | Format-Table TimeGenerated,Source,EventID,Message -AutoSize | Out-String -Width 200",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linux_families_differ_only_in_last_update() {
        let rhel = Manifest::for_platform(Platform::Rhel);
        let ubuntu = Manifest::for_platform(Platform::Ubuntu);

        assert_eq!(rhel.names().collect::<Vec<_>>(), ubuntu.names().collect::<Vec<_>>());

        let differing: Vec<&str> = rhel
            .metrics()
            .iter()
            .zip(ubuntu.metrics())
            .filter(|(a, b)| a.command != b.command)
            .map(|(a, _)| a.name)
            .collect();
        assert_eq!(differing, ["Last Update"]);

        let last = |m: &Manifest| {
            m.metrics()
                .iter()
                .find(|x| x.name == "Last Update")
                .unwrap()
                .command
                .clone()
        };
        assert!(last(&rhel).contains("dnf.rpm.log"));
        assert!(last(&ubuntu).contains("apt/history.log"));
    }

    #[test]
    fn metric_names_are_unique() {
        for p in Platform::ALL {
            let m = Manifest::for_platform(*p);
            let names: BTreeSet<_> = m.names().collect();
            assert_eq!(names.len(), m.metrics().len(), "duplicate metric in {p}");
        }
    }

    #[test]
    fn manifest_order_starts_with_hostname() {
        for p in Platform::ALL {
            assert_eq!(Manifest::for_platform(*p).names().next(), Some("Hostname"));
        }
    }

    #[test]
    fn systemd_identifiers_strip_suffix() {
        let listing = "sshd.service        loaded active running OpenSSH server daemon\n\
                       nginx.service       loaded failed failed  nginx\n\
                       \n\
                       user@1000.service   loaded active running User Manager\n";
        let ids = ServiceProbe::systemd().identifiers(listing);
        let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
        assert_eq!(ids, ["nginx", "sshd", "user@1000"]);
    }

    #[test]
    fn windows_identifiers_keep_names_verbatim() {
        let ids = ServiceProbe::windows().identifiers("MSSQLSERVER\r\nW32Time\r\n");
        assert!(ids.contains("MSSQLSERVER"));
        assert!(ids.contains("W32Time"));
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn status_commands_quote_hostile_names() {
        let systemd = ServiceProbe::systemd();
        assert_eq!(systemd.status_command("sshd"), "systemctl is-active sshd");
        assert_eq!(
            systemd.status_command("a b;rm"),
            "systemctl is-active 'a b;rm'"
        );
        assert_eq!(systemd.status_command("it's"), r"systemctl is-active 'it'\''s'");

        let windows = ServiceProbe::windows();
        assert_eq!(
            windows.status_command("O'Brien"),
            "(Get-Service -Name 'O''Brien').Status"
        );
    }
}
