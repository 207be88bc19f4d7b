use clap::{ArgAction, Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "zonewarden",
    version,
    about = "Audit and re-own dynamic DNS records in AD-integrated zones",
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Skip interactive confirmation prompts
    #[arg(short = 'y', long = "yes", global = true)]
    pub assume_yes: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args)]
pub struct ConnectionArgs {
    /// Bind account (sAMAccountName); not needed with --kerberos
    #[arg(short = 'u', long)]
    pub username: Option<String>,

    /// Bind password; prompted for when omitted
    #[arg(short = 'p', long)]
    pub password: Option<String>,

    /// Fully qualified domain name, e.g. corp.example.com
    #[arg(short = 'd', long)]
    pub domain: String,

    /// Domain controller hostname or IP
    #[arg(short = 'i', long = "dc-ip")]
    pub dc_ip: String,

    /// NetBIOS domain name; first label of the domain when omitted
    #[arg(short = 'n', long)]
    pub netbios: Option<String>,

    /// Server for live A/PTR checks; defaults to the domain controller
    #[arg(long = "dns-server")]
    pub dns_server: Option<String>,

    /// Connect over LDAPS (port 636)
    #[arg(short = 's', long = "ldaps")]
    pub secure_ldaps: bool,

    /// Authenticate via Kerberos (GSSAPI) using the current ticket cache
    #[arg(short = 'k', long)]
    pub kerberos: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// List DNS zones in the domain and forest partitions
    Zones,

    /// Audit dynamic A records in a forward zone
    ScanForward {
        /// Zone to scan; defaults to the domain's own zone
        #[arg(long)]
        zone: Option<String>,

        /// Report CSV path
        #[arg(short = 'o', long = "output", default_value = "forward_zone_report.csv")]
        output: String,

        /// Skip the console review table
        #[arg(long = "no-grid")]
        no_grid: bool,
    },

    /// Audit dynamic PTR records in reverse zones
    ScanReverse {
        /// Reverse zone to scan; repeat for several. Defaults to every
        /// in-addr.arpa zone the directory holds
        #[arg(long = "zone")]
        zones: Vec<String>,

        /// Report CSV path
        #[arg(short = 'o', long = "output", default_value = "reverse_zone_report.csv")]
        output: String,

        /// Skip the console review table
        #[arg(long = "no-grid")]
        no_grid: bool,
    },

    /// Apply ownership fixes from a flagged scan CSV
    Remediate {
        /// Scan CSV with RemediateOwner set on the rows to fix
        #[arg(short = 'f', long = "input")]
        input: String,

        /// Refuse a row when the live owner no longer matches its
        /// RecordOwner cell
        #[arg(long = "verify-owner")]
        verify_owner: bool,

        /// Show what would change without touching the directory
        #[arg(long = "dry-run")]
        dry_run: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_a_forward_scan_invocation() {
        let cli = Cli::parse_from([
            "zonewarden",
            "-u",
            "ops.admin",
            "-d",
            "corp.example.com",
            "-i",
            "dc01.corp.example.com",
            "-vv",
            "scan-forward",
            "--zone",
            "corp.example.com",
            "-o",
            "out.csv",
        ]);

        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.connection.domain, "corp.example.com");
        match cli.command {
            Command::ScanForward { zone, output, no_grid } => {
                assert_eq!(zone.as_deref(), Some("corp.example.com"));
                assert_eq!(output, "out.csv");
                assert!(!no_grid);
            }
            _ => panic!("expected scan-forward"),
        }
    }

    #[test]
    fn reverse_scan_zones_accumulate() {
        let cli = Cli::parse_from([
            "zonewarden",
            "-k",
            "-d",
            "corp.example.com",
            "-i",
            "dc01",
            "scan-reverse",
            "--zone",
            "100.168.192.in-addr.arpa",
            "--zone",
            "101.168.192.in-addr.arpa",
        ]);

        assert!(cli.connection.kerberos);
        match cli.command {
            Command::ScanReverse { zones, .. } => {
                assert_eq!(zones.len(), 2);
            }
            _ => panic!("expected scan-reverse"),
        }
    }
}
