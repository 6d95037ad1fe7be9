//! 客户端 IP 解析
//!
//! 直连部署用 peer 地址；经反向代理时取转发头，但只有 peer 落在
//! trusted_proxies（单 IP 或 CIDR）里、或自动判定为内网代理时才信。
//! 扫描日志和登录限流都吃这里的结果，伪造头不能被当成真实来源。

use std::net::{IpAddr, SocketAddr};

use actix_web::HttpRequest;
use actix_web::http::header::HeaderMap;
use tracing::debug;

use crate::config::get_config;

/// 私网 / 环回地址判定
///
/// IPv6 认 ::1、fc00::/7（ULA）和 fe80::/10（link-local）。
pub fn is_private_or_local(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_loopback(),
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || (v6.segments()[0] & 0xfe00) == 0xfc00
                || (v6.segments()[0] & 0xffc0) == 0xfe80
        }
    }
}

/// peer 是否在可信代理列表里。`ip` 允许带端口（actix 的 peer_addr 格式）。
pub fn is_trusted_proxy(ip: &str, trusted_proxies: &[String]) -> bool {
    let ip_addr = match ip.parse::<SocketAddr>() {
        Ok(sock) => sock.ip(),
        Err(_) => match ip.parse::<IpAddr>() {
            Ok(addr) => addr,
            Err(_) => return false,
        },
    };

    trusted_proxies.iter().any(|entry| {
        if entry.contains('/') {
            ip_in_cidr(&ip_addr, entry)
        } else {
            entry.parse::<IpAddr>().is_ok_and(|proxy| proxy == ip_addr)
        }
    })
}

/// `ip` 是否属于 `cidr`（"10.0.0.0/8" 这类写法），族不匹配算否
pub fn ip_in_cidr(ip: &IpAddr, cidr: &str) -> bool {
    let Some((network, prefix_len)) = cidr.split_once('/') else {
        return false;
    };
    let Ok(prefix_len) = prefix_len.parse::<u8>() else {
        return false;
    };
    let Ok(network_addr) = network.parse::<IpAddr>() else {
        return false;
    };

    match (ip, network_addr) {
        (IpAddr::V4(ip), IpAddr::V4(net)) if prefix_len <= 32 => {
            let mask = u32::MAX.checked_shl(32 - prefix_len as u32).unwrap_or(0);
            u32::from_be_bytes(ip.octets()) & mask == u32::from_be_bytes(net.octets()) & mask
        }
        (IpAddr::V6(ip), IpAddr::V6(net)) if prefix_len <= 128 => {
            let mask = u128::MAX.checked_shl(128 - prefix_len as u32).unwrap_or(0);
            u128::from_be_bytes(ip.octets()) & mask == u128::from_be_bytes(net.octets()) & mask
        }
        _ => false,
    }
}

/// peer + 转发头 -> 真实客户端 IP
///
/// 1. 配了 trusted_proxies 且 peer 命中 -> 信转发头
/// 2. 配了但没命中 -> 只认 peer，转发头可能是伪造的
/// 3. 没配且 peer 是私网/环回 -> 视为内网反代，有转发头就用
/// 4. 其余 -> peer（公网直连）
pub fn resolve_client_ip(
    peer: Option<&str>,
    forwarded: Option<String>,
    trusted_proxies: &[String],
) -> Option<String> {
    let peer = peer?;

    if !trusted_proxies.is_empty() {
        if is_trusted_proxy(peer, trusted_proxies) {
            let ip = forwarded.unwrap_or_else(|| peer.to_string());
            debug!("peer {} is a trusted proxy, client ip: {}", peer, ip);
            return Some(ip);
        }
        debug!("peer {} not in trusted_proxies, ignoring forwarded headers", peer);
        return Some(peer.to_string());
    }

    if let Ok(addr) = peer.parse::<IpAddr>()
        && is_private_or_local(&addr)
        && let Some(ip) = forwarded
    {
        debug!("private peer {}, using forwarded client ip: {}", peer, ip);
        return Some(ip);
    }

    Some(peer.to_string())
}

/// 转发头里的客户端 IP：X-Forwarded-For 第一跳，其次 X-Real-IP
pub fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|h| h.to_str().ok())
                .map(String::from)
        })
}

/// 从 HttpRequest 解析真实客户端 IP（配置驱动）
pub fn client_ip(req: &HttpRequest) -> Option<String> {
    let config = get_config();
    let forwarded = forwarded_ip(req.headers());

    // Unix socket 后面必然有反代，peer 地址没有意义
    if config.server.unix_socket.is_some() {
        return forwarded;
    }

    let conn_info = req.connection_info();
    let peer = conn_info.peer_addr();
    resolve_client_ip(peer, forwarded, &config.auth.trusted_proxies)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_private_and_loopback_v4() {
        for private in ["10.0.0.1", "172.16.0.1", "192.168.1.1", "127.0.0.1"] {
            assert!(is_private_or_local(&private.parse().unwrap()), "{}", private);
        }
        for public in ["8.8.8.8", "1.1.1.1"] {
            assert!(!is_private_or_local(&public.parse().unwrap()), "{}", public);
        }
    }

    #[test]
    fn test_private_and_loopback_v6() {
        for private in ["::1", "fd00::1", "fc00::1", "fe80::1"] {
            assert!(is_private_or_local(&private.parse().unwrap()), "{}", private);
        }
        assert!(!is_private_or_local(&"2001:4860:4860::8888".parse().unwrap()));
    }

    #[test]
    fn test_cidr_membership() {
        let ip: IpAddr = "192.168.1.100".parse().unwrap();
        assert!(ip_in_cidr(&ip, "192.168.1.0/24"));
        assert!(ip_in_cidr(&ip, "192.168.0.0/16"));
        assert!(!ip_in_cidr(&ip, "192.168.2.0/24"));
        assert!(!ip_in_cidr(&ip, "10.0.0.0/8"));

        let ip6: IpAddr = "2001:db8::1".parse().unwrap();
        assert!(ip_in_cidr(&ip6, "2001:db8::/32"));
        assert!(!ip_in_cidr(&ip6, "2001:db9::/32"));
        // 族不匹配
        assert!(!ip_in_cidr(&ip, "2001:db8::/32"));
    }

    #[test]
    fn test_trusted_proxy_matching() {
        let proxies = vec![
            "127.0.0.1".to_string(),
            "192.168.1.0/24".to_string(),
            "10.0.0.1".to_string(),
        ];

        assert!(is_trusted_proxy("127.0.0.1", &proxies));
        // peer_addr 带端口的形式
        assert!(is_trusted_proxy("127.0.0.1:8080", &proxies));
        assert!(is_trusted_proxy("192.168.1.50", &proxies));
        assert!(!is_trusted_proxy("8.8.8.8", &proxies));
        assert!(!is_trusted_proxy("192.168.2.1", &proxies));
        assert!(!is_trusted_proxy("not-an-ip", &proxies));
    }

    #[test]
    fn test_resolve_trusted_proxy_uses_forwarded() {
        let proxies = vec!["10.0.0.1".to_string()];
        let ip = resolve_client_ip(Some("10.0.0.1:443"), Some("203.0.113.9".to_string()), &proxies);
        assert_eq!(ip.as_deref(), Some("203.0.113.9"));
    }

    #[test]
    fn test_resolve_untrusted_peer_ignores_forwarded() {
        // 配了白名单，不在名单里的 peer 带的转发头是伪造风险
        let proxies = vec!["10.0.0.1".to_string()];
        let ip = resolve_client_ip(Some("8.8.8.8"), Some("203.0.113.9".to_string()), &proxies);
        assert_eq!(ip.as_deref(), Some("8.8.8.8"));
    }

    #[test]
    fn test_resolve_private_peer_auto_detects_proxy() {
        let ip = resolve_client_ip(Some("192.168.1.1"), Some("203.0.113.9".to_string()), &[]);
        assert_eq!(ip.as_deref(), Some("203.0.113.9"));
    }

    #[test]
    fn test_resolve_public_peer_direct() {
        let ip = resolve_client_ip(Some("198.51.100.7"), Some("203.0.113.9".to_string()), &[]);
        assert_eq!(ip.as_deref(), Some("198.51.100.7"));

        let ip = resolve_client_ip(None, Some("203.0.113.9".to_string()), &[]);
        assert_eq!(ip, None);
    }
}
