// SPDX-FileCopyrightText: © 2024 The remotefn authors
// SPDX-License-Identifier: MIT

use std::net::IpAddr;

#[derive(PartialEq, Eq, Debug)]
pub enum Proto {
    HTTP,
    HTTPS,
}

/// Parse the protocol, host and port from an url.
///
/// Used to bind the callback receiver socket, so the host must come out as
/// something the socket API accepts without name resolution.
pub fn parse_http_host(raw: &str) -> anyhow::Result<(Proto, String, u16)> {
    let re = regex::Regex::new(r"(\w+):\/\/(.*):(\d+)").unwrap();
    let res = re.captures(raw);
    match res {
        Some(val) => {
            let proto = match &val[1] {
                "http" => Proto::HTTP,
                "https" => Proto::HTTPS,
                _ => {
                    return Err(anyhow::anyhow!("Protocol Parse Error, got '{:?}'", raw));
                }
            };
            let port = match val[3].parse() {
                Ok(prt) => prt,
                Err(_) => {
                    return Err(anyhow::anyhow!("Port Parse Error, got '{:?}'", raw));
                }
            };
            let maybe_an_ip = val[2]
                .parse::<IpAddr>()
                .ok()
                .or_else(|| val[2].strip_prefix("[")?.strip_suffix("]")?.parse::<IpAddr>().ok());
            let host = match maybe_an_ip {
                Some(ip) => ip.to_string(),
                None => {
                    let fallback = val[2].trim().to_string();
                    if fallback.is_empty() {
                        return Err(anyhow::anyhow!("Host Parse Error, got '{:?}'", raw));
                    }
                    fallback
                }
            };
            Ok((proto, host, port))
        }
        None => Err(anyhow::anyhow!("Regexp Parse Error, got '{:?}'", raw)),
    }
}

/// Write `content` to `path` unless the file already exists.
pub fn create_template(path: &str, content: &str) -> anyhow::Result<()> {
    assert!(!path.is_empty());
    match std::path::Path::new(&path).exists() {
        true => anyhow::bail!("cannot overwrite configuration file: {}", path),
        false => {
            std::fs::write(path, content)?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_http_host() {
        let result = parse_http_host("http://192.168.3.3");
        assert!(result.is_err(), "Missing port");
        let result = parse_http_host("http://127.0.0.1:7035");
        assert_eq!(result.unwrap(), (Proto::HTTP, String::from("127.0.0.1"), 7035u16));
        let result = parse_http_host("https://example.com:8443");
        assert_eq!(result.unwrap(), (Proto::HTTPS, String::from("example.com"), 8443u16));
        let result = parse_http_host("http://[::1]:7035");
        assert_eq!(result.unwrap(), (Proto::HTTP, String::from("::1"), 7035u16));
        let result = parse_http_host("ftp://127.0.0.1:7035");
        assert!(result.is_err(), "Unsupported protocol");
    }
}
