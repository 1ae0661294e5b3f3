// crates/brightdata/src/ssrf.rs
//! SSRF guard for proxied image fetches (§4.2 "SSRF guard"): scheme must be
//! `http`/`https`, host must be allow-listed, and every resolved address in
//! the chain (including redirect hops) must not be private/loopback/
//! link-local/reserved/multicast.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use reqwest::Url;

use crate::error::BrightDataError;

const MAX_REDIRECTS: u8 = 5;

pub fn validate_scheme_and_host(url: &Url, allowed_hosts: &[String]) -> Result<(), BrightDataError> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(BrightDataError::InvalidInput(format!("disallowed scheme: {}", url.scheme())));
    }
    let host = url
        .host_str()
        .ok_or_else(|| BrightDataError::InvalidInput("url has no host".into()))?;
    if !allowed_hosts.iter().any(|allowed| host.eq_ignore_ascii_case(allowed)) {
        return Err(BrightDataError::InvalidInput(format!("host not allow-listed: {host}")));
    }
    Ok(())
}

/// Resolve `host` and reject if any address is not publicly routable.
pub async fn resolve_and_check(host: &str, port: u16) -> Result<(), BrightDataError> {
    let addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| BrightDataError::InvalidInput(format!("dns resolution failed for {host}: {e}")))?;
    let mut saw_any = false;
    for addr in addrs {
        saw_any = true;
        if is_disallowed_ip(addr.ip()) {
            return Err(BrightDataError::InvalidInput(format!("resolved address is not public: {}", addr.ip())));
        }
    }
    if !saw_any {
        return Err(BrightDataError::InvalidInput(format!("no addresses resolved for {host}")));
    }
    Ok(())
}

/// Fetch `url`, manually following redirects so every hop is re-validated
/// (a plain `reqwest::redirect::Policy::follow` would skip this check on
/// intermediate hops).
pub async fn fetch_guarded(
    http: &reqwest::Client,
    url: &str,
    allowed_hosts: &[String],
) -> Result<Vec<u8>, BrightDataError> {
    let mut current = Url::parse(url).map_err(|e| BrightDataError::InvalidInput(e.to_string()))?;
    for _ in 0..=MAX_REDIRECTS {
        validate_scheme_and_host(&current, allowed_hosts)?;
        let port = current.port_or_known_default().unwrap_or(443);
        resolve_and_check(current.host_str().unwrap_or_default(), port).await?;

        let response = http
            .get(current.clone())
            .send()
            .await
            .map_err(|e| BrightDataError::Vendor(crate::client::classify_reqwest_error(&e)))?;

        if response.status().is_redirection() {
            let location = response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| BrightDataError::InvalidInput("redirect with no Location header".into()))?;
            current = current
                .join(location)
                .map_err(|e| BrightDataError::InvalidInput(format!("invalid redirect target: {e}")))?;
            continue;
        }

        if !response.status().is_success() {
            return Err(BrightDataError::Vendor(scoutline_core::ExternalError::Permanent {
                service: "brightdata-image",
                message: format!("status {}", response.status()),
            }));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| BrightDataError::Vendor(crate::client::classify_reqwest_error(&e)))?;
        return Ok(bytes.to_vec());
    }
    Err(BrightDataError::InvalidInput("too many redirects".into()))
}

fn is_disallowed_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_disallowed_v4(v4),
        IpAddr::V6(v6) => is_disallowed_v6(v6),
    }
}

fn is_disallowed_v4(ip: Ipv4Addr) -> bool {
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_multicast()
        || ip.is_broadcast()
        || ip.is_unspecified()
        || ip.is_documentation()
}

fn is_disallowed_v6(ip: Ipv6Addr) -> bool {
    if ip.is_loopback() || ip.is_multicast() || ip.is_unspecified() {
        return true;
    }
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_disallowed_v4(v4);
    }
    let octets = ip.octets();
    let is_unique_local = octets[0] & 0xfe == 0xfc; // fc00::/7
    let is_link_local = octets[0] == 0xfe && (octets[1] & 0xc0) == 0x80; // fe80::/10
    is_unique_local || is_link_local
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_http_scheme() {
        let url = Url::parse("ftp://cdn.example.com/x.png").unwrap();
        let err = validate_scheme_and_host(&url, &["cdn.example.com".into()]).unwrap_err();
        assert!(matches!(err, BrightDataError::InvalidInput(_)));
    }

    #[test]
    fn rejects_host_not_on_allowlist() {
        let url = Url::parse("https://evil.example.com/x.png").unwrap();
        let err = validate_scheme_and_host(&url, &["cdn.example.com".into()]).unwrap_err();
        assert!(matches!(err, BrightDataError::InvalidInput(_)));
    }

    #[test]
    fn accepts_allow_listed_https_host() {
        let url = Url::parse("https://cdn.example.com/x.png").unwrap();
        assert!(validate_scheme_and_host(&url, &["cdn.example.com".into()]).is_ok());
    }

    #[test]
    fn loopback_and_private_v4_are_disallowed() {
        assert!(is_disallowed_v4(Ipv4Addr::new(127, 0, 0, 1)));
        assert!(is_disallowed_v4(Ipv4Addr::new(10, 0, 0, 5)));
        assert!(is_disallowed_v4(Ipv4Addr::new(169, 254, 1, 1)));
        assert!(!is_disallowed_v4(Ipv4Addr::new(93, 184, 216, 34)));
    }

    #[test]
    fn unique_local_and_link_local_v6_are_disallowed() {
        assert!(is_disallowed_v6("fc00::1".parse().unwrap()));
        assert!(is_disallowed_v6("fe80::1".parse().unwrap()));
        assert!(is_disallowed_v6(Ipv6Addr::LOCALHOST));
        assert!(!is_disallowed_v6("2606:4700:4700::1111".parse().unwrap()));
    }
}
