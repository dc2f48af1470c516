//! 按连接本地地址选择权限桶。
//!
//! 规则：
//! 1. `127.0.0.0/8` 一律归入 `localhost`；
//! 2. 否则取配置顺序中最后一个命中的地址段；
//! 3. 都不命中时归入 `*`。
//!
//! 以 `-` 开头的条目为排除项，命中时撤销此前的命中。

use std::net::IpAddr;

use crate::config::{ConfigError, LOCALHOST_PERMISSION_KEY, OrderedMap, WILDCARD_PERMISSION_KEY};

/// 单个地址段：`a.b.c.d`、`a.b.c.d/n`、IPv6 字面量或前缀。
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) struct HostPattern {
    network: IpAddr,
    prefix: u8,
    exclude: bool,
}

impl HostPattern {
    pub(crate) fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let (exclude, body) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let (address, prefix) = match body.split_once('/') {
            Some((address, prefix)) => (address, Some(prefix.parse::<u8>().ok()?)),
            None => (body, None),
        };
        let network = normalize(address.parse::<IpAddr>().ok()?);
        let max = match network {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        let prefix = prefix.unwrap_or(max);
        if prefix > max {
            return None;
        }
        Some(Self {
            network,
            prefix,
            exclude,
        })
    }

    fn contains(&self, address: IpAddr) -> bool {
        match (self.network, normalize(address)) {
            (IpAddr::V4(network), IpAddr::V4(candidate)) => {
                prefix_match(&network.octets(), &candidate.octets(), self.prefix)
            }
            (IpAddr::V6(network), IpAddr::V6(candidate)) => {
                prefix_match(&network.octets(), &candidate.octets(), self.prefix)
            }
            _ => false,
        }
    }
}

/// IPv4 映射的 IPv6 地址按 IPv4 处理。
fn normalize(address: IpAddr) -> IpAddr {
    match address {
        IpAddr::V6(v6) => v6
            .to_ipv4_mapped()
            .map(IpAddr::V4)
            .unwrap_or(IpAddr::V6(v6)),
        v4 => v4,
    }
}

fn prefix_match(network: &[u8], candidate: &[u8], prefix: u8) -> bool {
    let full = usize::from(prefix / 8);
    if network[..full] != candidate[..full] {
        return false;
    }
    let rest = prefix % 8;
    if rest == 0 {
        return true;
    }
    let mask = 0xffu8 << (8 - rest);
    network[full] & mask == candidate[full] & mask
}

fn is_loopback(address: IpAddr) -> bool {
    match normalize(address) {
        IpAddr::V4(v4) => v4.is_loopback(),
        IpAddr::V6(_) => false,
    }
}

/// 有序地址段列表，返回最后一个有效命中的下标。
#[derive(Debug, Clone, Default)]
pub(crate) struct HostList {
    entries: Vec<(usize, HostPattern)>,
}

impl HostList {
    /// `skip` 中的保留键不参与地址匹配，但保留原始下标。
    pub(crate) fn parse<'a, I>(keys: I, skip: &[&str]) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut entries = Vec::new();
        for (index, key) in keys.into_iter().enumerate() {
            if skip.contains(&key) {
                continue;
            }
            let pattern = HostPattern::parse(key)
                .ok_or_else(|| ConfigError::InvalidHostPattern(key.to_string()))?;
            entries.push((index, pattern));
        }
        Ok(Self { entries })
    }

    pub(crate) fn last_match(&self, address: IpAddr) -> Option<usize> {
        let mut last = None;
        for (index, pattern) in &self.entries {
            if pattern.contains(address) {
                last = if pattern.exclude { None } else { Some(*index) };
            }
        }
        last
    }
}

/// 权限桶解析器：由 hostLevelPermissions 的键构建，随设置快照一起替换。
#[derive(Debug, Clone)]
pub(crate) struct HostPermissions {
    keys: Vec<String>,
    list: HostList,
}

impl HostPermissions {
    pub(crate) fn build<V>(permissions: &OrderedMap<V>) -> Result<Self, ConfigError> {
        let keys: Vec<String> = permissions.keys().map(str::to_string).collect();
        let list = HostList::parse(
            keys.iter().map(String::as_str),
            &[LOCALHOST_PERMISSION_KEY, WILDCARD_PERMISSION_KEY],
        )?;
        Ok(Self { keys, list })
    }

    /// 本地地址 -> 权限桶名。
    pub(crate) fn resolve_key(&self, local: IpAddr) -> &str {
        if is_loopback(local) {
            return LOCALHOST_PERMISSION_KEY;
        }
        self.list
            .last_match(local)
            .and_then(|index| self.keys.get(index))
            .map(String::as_str)
            .unwrap_or(WILDCARD_PERMISSION_KEY)
    }
}
