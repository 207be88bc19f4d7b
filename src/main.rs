const LOGO: &str = r#"
=====================================================================
  ZONEWARDEN  |  DNS record ownership audit for AD-integrated zones
=====================================================================
"#;

use clap::Parser;
use dialoguer::{theme::ColorfulTheme, Password};

pub mod acl;
pub mod args;
pub mod commands;
pub mod debug;
pub mod directory;
pub mod dns;
pub mod ldap;
pub mod report;

use args::{Cli, Command};
use ldap::LdapConfig;

fn main() {
    let cli = Cli::parse();
    debug::set_debug_level(cli.verbose);

    println!("{}", LOGO);

    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("[!] {}", e);
            std::process::exit(1);
        }
    };

    let (mut conn, search_base) = match ldap::ldap_connect(&config) {
        Ok(connected) => connected,
        Err(e) => {
            eprintln!(
                "[!] Failed to connect to LDAP server: {}. Check credentials, Kerberos ticket, or connection.",
                e
            );
            std::process::exit(1);
        }
    };

    if config.kerberos {
        println!("[+] Bound to {} with the current Kerberos identity", config.dc_ip);
    } else {
        println!("[+] Bound to {} as {}@{}", config.dc_ip, config.username, config.domain);
    }

    let result = match &cli.command {
        Command::Zones => commands::list_zones::run(&mut conn, &search_base),
        Command::ScanForward {
            zone,
            output,
            no_grid,
        } => commands::scan_forward::run(
            &mut conn,
            &search_base,
            &config,
            zone.as_deref(),
            output,
            *no_grid,
        ),
        Command::ScanReverse {
            zones,
            output,
            no_grid,
        } => commands::scan_reverse::run(
            &mut conn,
            &search_base,
            &config,
            zones,
            output,
            *no_grid,
            cli.assume_yes,
        ),
        Command::Remediate {
            input,
            verify_owner,
            dry_run,
        } => commands::remediate::run(
            &mut conn,
            &search_base,
            &config,
            input,
            *verify_owner,
            *dry_run,
            cli.assume_yes,
        ),
    };

    if let Err(e) = result {
        eprintln!("[!] {}", e);
        std::process::exit(1);
    }
}

fn build_config(cli: &Cli) -> Result<LdapConfig, String> {
    let connection = &cli.connection;

    let username = match &connection.username {
        Some(name) => name.clone(),
        None if connection.kerberos => String::new(),
        None => return Err("--username is required unless --kerberos is used".to_string()),
    };

    let password = if connection.kerberos {
        String::new()
    } else {
        match &connection.password {
            Some(password) => password.clone(),
            None => Password::with_theme(&ColorfulTheme::default())
                .with_prompt(format!("Password for {}", username))
                .interact()
                .map_err(|e| format!("Could not read password: {}", e))?,
        }
    };

    let netbios = connection
        .netbios
        .clone()
        .unwrap_or_else(|| ldap::netbios_default(&connection.domain));
    let dns_server = connection
        .dns_server
        .clone()
        .unwrap_or_else(|| connection.dc_ip.clone());

    Ok(LdapConfig {
        username,
        password,
        domain: connection.domain.clone(),
        dc_ip: connection.dc_ip.clone(),
        netbios,
        dns_server,
        secure_ldaps: connection.secure_ldaps,
        kerberos: connection.kerberos,
    })
}
