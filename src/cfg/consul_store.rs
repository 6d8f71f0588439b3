//! Consul KV 存储
//!
//! 通过 Consul HTTP API 读取 KV，作为远程配置提供者的数据来源

use base64::{engine::general_purpose, Engine as _};
use garde::Validate;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use std::collections::HashMap;
use std::time::Duration;

use super::error::CfgError;
use super::serde_duration::{serde_as, HumanDur};
use super::store::{RemoteStore, StoreError};
use crate::impl_try_from;

/// Consul 存储配置
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, SmartDefault, Validate)]
#[serde(default)]
pub struct ConsulStoreConfig {
    /// Consul 地址，如 "http://127.0.0.1:8500"
    #[default = "http://127.0.0.1:8500"]
    #[garde(pattern("^https?://.+"))]
    pub address: String,

    /// key 前缀，只读取该前缀下的 key，返回时去掉前缀
    #[garde(skip)]
    pub prefix: String,

    /// 数据中心，默认使用 agent 所在数据中心
    #[garde(skip)]
    pub datacenter: Option<String>,

    /// ACL token
    #[garde(skip)]
    pub token: Option<String>,

    /// 单次 HTTP 请求超时
    #[default(Duration::from_secs(10))]
    #[serde_as(as = "HumanDur")]
    #[garde(skip)]
    pub timeout: Duration,
}

/// Consul KV 存储
///
/// - `get_value` 对应 `GET /v1/kv/{prefix}{key}?raw`
/// - `get_all_values` 对应 `GET /v1/kv/{prefix}?recurse`，一次请求取回前缀下的全部 key，
///   得到同一时刻的一致视图
///
/// key 按 `/` 分段后逐段做百分号编码
///
/// # 示例
/// ```no_run
/// use remote_cfg::cfg::{ConsulStore, ConsulStoreConfig, RemoteStore};
///
/// let store = ConsulStore::new(ConsulStoreConfig {
///     address: "http://consul:8500".to_string(),
///     prefix: "my-app/".to_string(),
///     ..Default::default()
/// }).unwrap();
///
/// let version = store.get_value("Version").unwrap();
/// ```
pub struct ConsulStore {
    address: String,
    prefix: String,
    datacenter: Option<String>,
    token: Option<String>,
    client: Client,
}

impl ConsulStore {
    pub fn new(config: ConsulStoreConfig) -> Result<Self, CfgError> {
        config.validate().map_err(CfgError::invalid_options)?;

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| CfgError::InvalidOptions(format!("创建 HTTP 客户端失败: {}", e)))?;

        Ok(Self {
            address: config.address.trim_end_matches('/').to_string(),
            prefix: config.prefix,
            datacenter: config.datacenter,
            token: config.token,
            client,
        })
    }

    fn get(&self, url: &str) -> RequestBuilder {
        let mut request = self.client.get(url);
        if let Some(dc) = &self.datacenter {
            request = request.query(&[("dc", dc.as_str())]);
        }
        if let Some(token) = &self.token {
            request = request.header("X-Consul-Token", token);
        }
        request
    }

    fn kv_url(&self, full_key: &str) -> String {
        let path = full_key
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        format!("{}/v1/kv/{}", self.address, path)
    }

    /// 读取完整路径的 key，不存在时返回 None
    fn fetch_raw(&self, full_key: &str) -> Result<Option<String>, StoreError> {
        let url = format!("{}?raw", self.kv_url(full_key));
        let Some(resp) = self.send(&url)? else {
            return Ok(None);
        };

        let bytes = resp.bytes().map_err(transport_error)?;
        String::from_utf8(bytes.to_vec())
            .map(Some)
            .map_err(|_| StoreError::InvalidResponse(format!("key {} 的值不是 UTF-8", full_key)))
    }

    /// 一次请求读取前缀下的所有 key（完整路径）
    fn fetch_recurse(&self) -> Result<Vec<KvPair>, StoreError> {
        let url = format!("{}?recurse", self.kv_url(&self.prefix));
        let Some(resp) = self.send(&url)? else {
            return Ok(Vec::new());
        };

        resp.json::<Vec<KvPair>>()
            .map_err(|e| StoreError::InvalidResponse(format!("解析 KV 列表失败: {}", e)))
    }

    /// 发送请求，404 返回 None，其他非 2xx 状态视为不可用
    fn send(&self, url: &str) -> Result<Option<Response>, StoreError> {
        let resp = self.get(url).send().map_err(transport_error)?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(resp)),
            status => Err(StoreError::Unavailable(format!(
                "Consul 返回错误状态: {}",
                status
            ))),
        }
    }
}

/// `?recurse` 返回的单个条目，Value 为 base64 编码，空值时为 null
#[derive(Debug, Deserialize)]
struct KvPair {
    #[serde(rename = "Key")]
    key: String,
    #[serde(rename = "Value")]
    value: Option<String>,
}

impl KvPair {
    fn decode(&self) -> Result<String, StoreError> {
        let Some(encoded) = &self.value else {
            return Ok(String::new());
        };
        let bytes = general_purpose::STANDARD.decode(encoded).map_err(|e| {
            StoreError::InvalidResponse(format!("key {} 的值不是合法的 base64: {}", self.key, e))
        })?;
        String::from_utf8(bytes)
            .map_err(|_| StoreError::InvalidResponse(format!("key {} 的值不是 UTF-8", self.key)))
    }
}

impl_try_from!(ConsulStoreConfig => ConsulStore, CfgError);

fn transport_error(e: reqwest::Error) -> StoreError {
    if e.is_timeout() {
        StoreError::Timeout(e.to_string())
    } else {
        StoreError::Unavailable(e.to_string())
    }
}

impl RemoteStore for ConsulStore {
    fn get_value(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.fetch_raw(&format!("{}{}", self.prefix, key))
    }

    fn get_all_values(&self) -> Result<HashMap<String, String>, StoreError> {
        let mut values = HashMap::new();
        for pair in self.fetch_recurse()? {
            // 目录节点
            if pair.key.ends_with('/') {
                continue;
            }
            let Some(key) = pair.key.strip_prefix(self.prefix.as_str()) else {
                continue;
            };
            values.insert(key.to_string(), pair.decode()?);
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn store(server: &mockito::Server, prefix: &str) -> ConsulStore {
        ConsulStore::new(ConsulStoreConfig {
            address: server.url(),
            prefix: prefix.to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    fn key_path(key: &str) -> Matcher {
        Matcher::Regex(format!(r"^/v1/kv/{}(\?.*)?$", key))
    }

    #[test]
    fn test_consul_config_defaults() {
        let config: ConsulStoreConfig = serde_json::from_str(r#"{"prefix": "app/"}"#).unwrap();
        assert_eq!(config.address, "http://127.0.0.1:8500");
        assert_eq!(config.prefix, "app/");
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert!(config.token.is_none());
    }

    #[test]
    fn test_consul_config_invalid_address() {
        let result = ConsulStore::new(ConsulStoreConfig {
            address: "consul:8500".to_string(),
            ..Default::default()
        });
        assert!(matches!(result, Err(CfgError::InvalidOptions(_))));
    }

    #[test]
    fn test_consul_address_trim() {
        let store = ConsulStore::try_from(ConsulStoreConfig {
            address: "http://localhost:8500/".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(store.address, "http://localhost:8500");
    }

    #[test]
    fn test_consul_get_value() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", key_path("Version"))
            .with_status(200)
            .with_body("42")
            .create();

        let value = store(&server, "").get_value("Version").unwrap();
        mock.assert();
        assert_eq!(value, Some("42".to_string()));
    }

    #[test]
    fn test_consul_get_value_not_found() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", key_path("Version"))
            .with_status(404)
            .create();

        assert_eq!(store(&server, "").get_value("Version").unwrap(), None);
        mock.assert();
    }

    #[test]
    fn test_consul_get_value_empty_string() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("GET", key_path("Version"))
            .with_status(200)
            .with_body("")
            .create();

        assert_eq!(
            store(&server, "").get_value("Version").unwrap(),
            Some(String::new())
        );
    }

    #[test]
    fn test_consul_get_value_server_error() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("GET", key_path("Version"))
            .with_status(500)
            .create();

        let err = store(&server, "").get_value("Version").unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert!(err.to_string().contains("500"));
    }

    #[test]
    fn test_consul_get_value_invalid_utf8() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("GET", key_path("Blob"))
            .with_status(200)
            .with_body(vec![0xff, 0xfe, 0xfd])
            .create();

        let err = store(&server, "").get_value("Blob").unwrap_err();
        assert!(matches!(err, StoreError::InvalidResponse(_)));
    }

    #[test]
    fn test_consul_unreachable() {
        let store = ConsulStore::new(ConsulStoreConfig {
            address: "http://127.0.0.1:1".to_string(),
            timeout: Duration::from_secs(2),
            ..Default::default()
        })
        .unwrap();

        let err = store.get_value("Version").unwrap_err();
        assert!(matches!(
            err,
            StoreError::Unavailable(_) | StoreError::Timeout(_)
        ));
    }

    /// 构造 `?recurse` 的响应体，None 表示 Consul 返回的 null 值
    fn recurse_body(pairs: &[(&str, Option<&str>)]) -> String {
        let entries: Vec<serde_json::Value> = pairs
            .iter()
            .map(|(key, value)| {
                serde_json::json!({
                    "Key": key,
                    "Value": value.map(|v| general_purpose::STANDARD.encode(v)),
                    "Flags": 0,
                })
            })
            .collect();
        serde_json::Value::Array(entries).to_string()
    }

    fn recurse_mock(server: &mut mockito::Server, prefix: &str) -> mockito::Mock {
        server
            .mock("GET", Matcher::Regex(format!(r"^/v1/kv/{}(\?.*)?$", prefix)))
            .match_query(Matcher::Regex("recurse".to_string()))
    }

    #[test]
    fn test_consul_get_all_values() {
        let mut server = mockito::Server::new();
        let list = recurse_mock(&mut server, "")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(recurse_body(&[
                ("A", Some("x")),
                ("Version", Some("1")),
                ("db/", None),
                ("db/url", Some("postgres://db")),
                ("empty", None),
            ]))
            .create();

        let values = store(&server, "").get_all_values().unwrap();
        list.assert();
        assert_eq!(values.len(), 4);
        assert_eq!(values.get("A"), Some(&"x".to_string()));
        assert_eq!(values.get("Version"), Some(&"1".to_string()));
        assert_eq!(values.get("db/url"), Some(&"postgres://db".to_string()));
        assert_eq!(values.get("empty"), Some(&String::new()));
        assert!(!values.contains_key("db/"));
    }

    #[test]
    fn test_consul_get_all_values_single_request() {
        let mut server = mockito::Server::new();
        let list = recurse_mock(&mut server, "")
            .with_status(200)
            .with_body(recurse_body(&[("A", Some("y")), ("Version", Some("2"))]))
            .expect(1)
            .create();
        // 全量读取不允许再逐个读取 key
        let per_key = server
            .mock("GET", Matcher::Regex(r"^/v1/kv/[^?]+".to_string()))
            .with_status(200)
            .with_body("x")
            .expect(0)
            .create();

        let values = store(&server, "").get_all_values().unwrap();
        list.assert();
        per_key.assert();
        assert_eq!(values.get("A"), Some(&"y".to_string()));
        assert_eq!(values.get("Version"), Some(&"2".to_string()));
    }

    #[test]
    fn test_consul_get_all_values_with_prefix() {
        let mut server = mockito::Server::new();
        let _list = recurse_mock(&mut server, "app/")
            .with_status(200)
            .with_body(recurse_body(&[("app/", None), ("app/Version", Some("7"))]))
            .create();
        let version = server
            .mock("GET", "/v1/kv/app/Version")
            .match_query(Matcher::Regex("raw".to_string()))
            .with_status(200)
            .with_body("7")
            .create();

        let store = store(&server, "app/");
        let values = store.get_all_values().unwrap();
        assert_eq!(values, HashMap::from([("Version".to_string(), "7".to_string())]));

        // 单 key 读取同样带前缀
        assert_eq!(store.get_value("Version").unwrap(), Some("7".to_string()));
        version.assert();
    }

    #[test]
    fn test_consul_get_all_values_empty_keyspace() {
        let mut server = mockito::Server::new();
        let _list = recurse_mock(&mut server, "")
            .with_status(404)
            .create();

        assert!(store(&server, "").get_all_values().unwrap().is_empty());
    }

    #[test]
    fn test_consul_get_all_values_malformed_listing() {
        let mut server = mockito::Server::new();
        let _list = recurse_mock(&mut server, "")
            .with_status(200)
            .with_body("not json")
            .create();

        let err = store(&server, "").get_all_values().unwrap_err();
        assert!(matches!(err, StoreError::InvalidResponse(_)));
    }

    #[test]
    fn test_consul_get_all_values_bad_encoding() {
        let mut server = mockito::Server::new();
        let _list = recurse_mock(&mut server, "")
            .with_status(200)
            .with_body(r#"[{"Key": "A", "Value": "!!not base64!!"}]"#)
            .create();
        let err = store(&server, "").get_all_values().unwrap_err();
        assert!(matches!(err, StoreError::InvalidResponse(_)));

        let mut server = mockito::Server::new();
        let _list = recurse_mock(&mut server, "")
            .with_status(200)
            .with_body(r#"[{"Key": "Blob", "Value": "//79"}]"#)
            .create();
        let err = store(&server, "").get_all_values().unwrap_err();
        assert!(matches!(err, StoreError::InvalidResponse(_)));
    }

    #[test]
    fn test_consul_key_with_reserved_characters() {
        let mut server = mockito::Server::new();
        let question = server
            .mock("GET", "/v1/kv/a%3Fb")
            .match_query(Matcher::Regex("raw".to_string()))
            .with_status(200)
            .with_body("v")
            .create();
        let hash = server
            .mock("GET", "/v1/kv/app/feature%23beta%25")
            .match_query(Matcher::Regex("raw".to_string()))
            .with_status(200)
            .with_body("on")
            .create();

        assert_eq!(store(&server, "").get_value("a?b").unwrap(), Some("v".to_string()));
        assert_eq!(
            store(&server, "app/").get_value("feature#beta%").unwrap(),
            Some("on".to_string())
        );
        question.assert();
        hash.assert();
    }

    #[test]
    fn test_consul_token_and_datacenter() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/v1/kv/Version")
            .match_query(Matcher::UrlEncoded("dc".to_string(), "dc1".to_string()))
            .match_header("x-consul-token", "secret")
            .with_status(200)
            .with_body("1")
            .create();

        let store = ConsulStore::new(ConsulStoreConfig {
            address: server.url(),
            datacenter: Some("dc1".to_string()),
            token: Some("secret".to_string()),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(store.get_value("Version").unwrap(), Some("1".to_string()));
        mock.assert();
    }
}
