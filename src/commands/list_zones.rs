// Zone listing: what the directory serves, split by partition.

use crate::debug::debug_log;
use crate::dns::zones::{self, ZoneRef};
use ldap3::LdapConn;

pub fn run(ldap: &mut LdapConn, search_base: &str) -> Result<(), Box<dyn std::error::Error>> {
    debug_log(1, "Starting DNS zone enumeration");
    println!("[*] Querying DNS zones...\n");

    println!("=== Domain DNS Zones ===");
    let domain_zones = zones::query_dns_zones(ldap, search_base, false)?;
    print_zone_list(&domain_zones);

    println!("\n=== Forest DNS Zones ===");
    let forest_zones = zones::query_dns_zones(ldap, search_base, true)?;
    print_zone_list(&forest_zones);

    debug_log(1, "Zone enumeration complete");
    Ok(())
}

fn print_zone_list(zone_list: &[ZoneRef]) {
    if zone_list.is_empty() {
        println!("  (none found)");
        return;
    }
    for zone in zone_list {
        if zones::is_reverse_zone(&zone.name) {
            println!("  {}  (reverse)", zone.name);
        } else {
            println!("  {}", zone.name);
        }
    }
}
