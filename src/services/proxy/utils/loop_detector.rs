//! 代理回环检测工具
//!
//! 防止代理配置指向自身导致无限循环

use url::{Host, Url};

/// 检查目标 URL 是否指向自身代理端口
///
/// 无法解析的 URL 不视为回环，交给上游请求报错。
pub fn is_proxy_loop(target_url: &str, own_port: u16) -> bool {
    let Ok(url) = Url::parse(target_url) else {
        return false;
    };
    if url.port_or_known_default() != Some(own_port) {
        return false;
    }

    match url.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => ip.is_loopback() || ip.is_unspecified(),
        Some(Host::Ipv6(ip)) => ip.is_loopback() || ip.is_unspecified(),
        None => false,
    }
}
