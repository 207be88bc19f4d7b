use crate::debug::debug_log;
use ldap3::{LdapConn, LdapConnSettings, LdapError, Scope};
use std::time::Duration;

const CONNECTION_TIMEOUT_SECS: u64 = 30;

#[derive(Clone)]
pub struct LdapConfig {
    pub username: String,
    pub password: String,
    pub domain: String,
    pub dc_ip: String,
    /// NetBIOS domain name used when rendering owners as `DOMAIN\name`.
    pub netbios: String,
    /// Server queried for wire A/PTR cross-checks; usually the DC itself.
    pub dns_server: String,
    pub secure_ldaps: bool,
    pub kerberos: bool,
}

impl LdapConfig {
    pub fn search_base(&self) -> String {
        self.domain
            .split('.')
            .map(|part| format!("DC={}", part))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Default NetBIOS name when none is given: first domain label, uppercased.
pub fn netbios_default(domain: &str) -> String {
    domain
        .split('.')
        .next()
        .unwrap_or(domain)
        .to_ascii_uppercase()
}

#[cfg(target_os = "linux")]
pub fn ldap_connect(config: &LdapConfig) -> Result<(LdapConn, String), LdapError> {
    let settings = LdapConnSettings::new()
        .set_conn_timeout(Duration::from_secs(CONNECTION_TIMEOUT_SECS))
        .set_no_tls_verify(true);

    let ldap_url = if config.secure_ldaps {
        format!("ldaps://{}", config.dc_ip)
    } else {
        format!("ldap://{}", config.dc_ip)
    };

    debug_log(2, format!("Connecting to {}", ldap_url));
    let mut ldap = LdapConn::with_settings(settings, &ldap_url)?;

    if config.kerberos {
        println!("[*] Using Kerberos authentication for LDAP.");
        ldap.sasl_gssapi_bind(&config.dc_ip)?.success()?;
    } else {
        let bind_dn = format!("{}@{}", config.username, config.domain);
        ldap.simple_bind(&bind_dn, &config.password)?.success()?;
    }

    let search_base = config.search_base();

    let (results, _) = ldap
        .search(
            &search_base,
            Scope::Base,
            "(objectClass=*)",
            vec!["defaultNamingContext"],
        )?
        .success()?;

    if results.is_empty() {
        println!("[!] Warning: No results returned from the base search.");
    }

    Ok((ldap, search_base))
}

#[cfg(not(target_os = "linux"))]
pub fn ldap_connect(config: &LdapConfig) -> Result<(LdapConn, String), LdapError> {
    let settings = LdapConnSettings::new()
        .set_conn_timeout(Duration::from_secs(CONNECTION_TIMEOUT_SECS))
        .set_no_tls_verify(true);

    let ldap_url = if config.secure_ldaps {
        format!("ldaps://{}", config.dc_ip)
    } else {
        format!("ldap://{}", config.dc_ip)
    };

    debug_log(2, format!("Connecting to {}", ldap_url));
    let mut ldap = LdapConn::with_settings(settings, &ldap_url)?;

    if config.kerberos {
        #[cfg(target_os = "windows")]
        ldap.sasl_gssapi_bind(&config.dc_ip)?.success()?;
        #[cfg(not(target_os = "windows"))]
        {
            println!("[!] Kerberos authentication is not available on this platform. Use a password bind.");
            return Err(LdapError::Io {
                source: std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "Kerberos is not supported on this platform",
                ),
            });
        }
    } else {
        let bind_dn = format!("{}@{}", config.username, config.domain);
        ldap.simple_bind(&bind_dn, &config.password)?.success()?;
    }

    let search_base = config.search_base();

    let (results, _) = ldap
        .search(
            &search_base,
            Scope::Base,
            "(objectClass=*)",
            vec!["distinguishedName"],
        )?
        .success()?;

    if results.is_empty() {
        println!("[!] Warning: No results returned from the base search.");
    }

    Ok((ldap, search_base))
}

pub fn escape_filter(input: &str) -> String {
    input
        .replace('\\', "\\5C")
        .replace('*', "\\2A")
        .replace('(', "\\28")
        .replace(')', "\\29")
        .replace('\0', "\\00")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_base_from_domain() {
        let config = LdapConfig {
            username: String::new(),
            password: String::new(),
            domain: "corp.example.com".to_string(),
            dc_ip: String::new(),
            netbios: String::new(),
            dns_server: String::new(),
            secure_ldaps: false,
            kerberos: false,
        };
        assert_eq!(config.search_base(), "DC=corp,DC=example,DC=com");
    }

    #[test]
    fn netbios_defaults_to_first_label() {
        assert_eq!(netbios_default("contoso.com"), "CONTOSO");
        assert_eq!(netbios_default("corp"), "CORP");
    }

    #[test]
    fn filter_escaping() {
        assert_eq!(escape_filter("a*b(c)d"), "a\\2Ab\\28c\\29d");
        assert_eq!(escape_filter("plain"), "plain");
    }
}
