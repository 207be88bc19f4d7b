pub mod list_zones;
pub mod remediate;
pub mod scan_forward;
pub mod scan_reverse;

/// Nodes that belong to the zone plumbing rather than to hosts.
pub(crate) fn is_infrastructure_name(name: &str, zone: &str) -> bool {
    name == "@"
        || name.eq_ignore_ascii_case("ForestDnsZones")
        || name.eq_ignore_ascii_case("DomainDnsZones")
        || name.eq_ignore_ascii_case(zone)
}

/// DNS-name comparison: case-insensitive, trailing root dot ignored.
pub(crate) fn names_equal(a: &str, b: &str) -> bool {
    a.trim_end_matches('.')
        .eq_ignore_ascii_case(b.trim_end_matches('.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infrastructure_names_are_excluded() {
        assert!(is_infrastructure_name("@", "corp.example.com"));
        assert!(is_infrastructure_name("forestdnszones", "corp.example.com"));
        assert!(is_infrastructure_name("DomainDnsZones", "corp.example.com"));
        assert!(is_infrastructure_name("corp.example.com", "corp.example.com"));
        assert!(!is_infrastructure_name("web01", "corp.example.com"));
    }

    #[test]
    fn name_comparison_ignores_case_and_root_dot() {
        assert!(names_equal("WEB01.Corp.Example.Com.", "web01.corp.example.com"));
        assert!(!names_equal("web02.corp.example.com", "web01.corp.example.com"));
    }
}
