use std::path::Path;

use async_trait::async_trait;
use regex::{Captures, Regex};
use serde::Serialize;
use uaparser::{Parser as _, UserAgentParser as UapParser};

use super::LookupError;

const OTHER: &str = "Other";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Client {
    pub user_agent: UserAgent,
    pub os: Os,
    pub device: Device,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserAgent {
    pub family: String,
    pub major: String,
    pub minor: String,
    pub patch: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Os {
    pub family: String,
    pub major: String,
    pub minor: String,
    pub patch: String,
    pub patch_minor: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Device {
    pub family: String,
    pub brand: String,
    pub model: String,
}

#[async_trait]
pub trait UserAgentParser: Send + Sync {
    async fn parse(&self, user_agent: &str) -> Result<Client, LookupError>;
}

/// One pattern in an ordered table. When `family` is `None` the first capture
/// group names the family and version groups start at the second.
struct Rule {
    pattern: Regex,
    family: Option<&'static str>,
}

impl Rule {
    fn new(pattern: &str, family: Option<&'static str>) -> Self {
        Self {
            pattern: Regex::new(pattern).expect("valid regex"),
            family,
        }
    }

    fn apply(&self, input: &str) -> Option<(String, [String; 3])> {
        let caps = self.pattern.captures(input)?;
        let (family, first) = match self.family {
            Some(family) => (family.to_string(), 1),
            None => (group(&caps, 1), 2),
        };
        Some((
            family,
            [
                group(&caps, first),
                group(&caps, first + 1),
                group(&caps, first + 2),
            ],
        ))
    }
}

fn group(caps: &Captures<'_>, i: usize) -> String {
    caps.get(i).map(|m| m.as_str().to_string()).unwrap_or_default()
}

/// Table-driven parser covering mainstream browsers, CLI tools, crawlers and
/// operating systems. Unknown input maps to `Other` rather than an error.
pub struct RegexUserAgentParser {
    agents: Vec<Rule>,
    systems: Vec<Rule>,
    devices: Vec<(Regex, [&'static str; 3])>,
}

impl Default for RegexUserAgentParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RegexUserAgentParser {
    pub fn new() -> Self {
        const VERSION: &str = r"/(\d+)(?:\.(\d+))?(?:\.(\d+))?";
        let agents = vec![
            Rule::new(
                &format!(r"(curl|Wget|HTTPie|python-requests|Go-http-client){VERSION}"),
                None,
            ),
            Rule::new(
                &format!(r"(Googlebot|bingbot|DuckDuckBot|YandexBot|Baiduspider){VERSION}"),
                None,
            ),
            Rule::new(&format!(r"Edg(?:e|A|iOS)?{VERSION}"), Some("Edge")),
            Rule::new(&format!(r"(?:OPR|Opera){VERSION}"), Some("Opera")),
            Rule::new(&format!(r"SamsungBrowser{VERSION}"), Some("Samsung Internet")),
            Rule::new(&format!(r"(?:Firefox|FxiOS){VERSION}"), Some("Firefox")),
            Rule::new(&format!(r"CriOS{VERSION}"), Some("Chrome Mobile iOS")),
            Rule::new(&format!(r"Chrome{VERSION}"), Some("Chrome")),
            Rule::new(&format!(r"Version{VERSION}.*Safari/"), Some("Safari")),
        ];

        let systems = vec![
            Rule::new(r"Windows NT (\d+)\.(\d+)", Some("Windows")),
            Rule::new(r"(?:iPhone|CPU) OS (\d+)_(\d+)(?:_(\d+))?", Some("iOS")),
            Rule::new(r"Mac OS X (\d+)[_.](\d+)(?:[_.](\d+))?", Some("Mac OS X")),
            Rule::new(r"Android (\d+)(?:\.(\d+))?(?:\.(\d+))?", Some("Android")),
            Rule::new(r"CrOS", Some("Chrome OS")),
            Rule::new(r"Linux", Some("Linux")),
        ];

        let devices = vec![
            (r"(?i)bot|crawler|spider", ["Spider", "Spider", "Desktop"]),
            (r"iPhone", ["iPhone", "Apple", "iPhone"]),
            (r"iPad", ["iPad", "Apple", "iPad"]),
            (r"Macintosh", ["Mac", "Apple", "Mac"]),
            (r"Android.*Mobile", ["Generic Smartphone", "Generic", "Smartphone"]),
            (r"Android", ["Generic Tablet", "Generic", "Tablet"]),
        ]
        .into_iter()
        .map(|(pattern, device)| (Regex::new(pattern).expect("valid regex"), device))
        .collect();

        Self {
            agents,
            systems,
            devices,
        }
    }

    fn parse_sync(&self, input: &str) -> Client {
        let (family, [major, minor, patch]) = first_match(&self.agents, input);
        let user_agent = UserAgent {
            family,
            major,
            minor,
            patch,
        };

        let (family, [major, minor, patch]) = first_match(&self.systems, input);
        let os = Os {
            family,
            major,
            minor,
            patch,
            patch_minor: String::new(),
        };

        let [family, brand, model] = self
            .devices
            .iter()
            .find(|(pattern, _)| pattern.is_match(input))
            .map_or([OTHER, "", ""], |(_, device)| *device);
        let device = Device {
            family: family.to_string(),
            brand: brand.to_string(),
            model: model.to_string(),
        };

        Client {
            user_agent,
            os,
            device,
        }
    }
}

fn first_match(rules: &[Rule], input: &str) -> (String, [String; 3]) {
    rules
        .iter()
        .find_map(|rule| rule.apply(input))
        .unwrap_or_else(|| (OTHER.to_string(), Default::default()))
}

#[async_trait]
impl UserAgentParser for RegexUserAgentParser {
    async fn parse(&self, user_agent: &str) -> Result<Client, LookupError> {
        if user_agent.trim().is_empty() {
            return Err(LookupError::Failed("empty user agent".to_string()));
        }
        Ok(self.parse_sync(user_agent))
    }
}

/// Parser driven by the uap-core `regexes.yaml` database.
pub struct UapUserAgentParser {
    parser: UapParser,
}

impl UapUserAgentParser {
    pub fn from_yaml(path: &Path) -> Result<Self, LookupError> {
        let path_str = path
            .to_str()
            .ok_or_else(|| LookupError::Failed(format!("non UTF-8 path {}", path.display())))?;
        let parser = UapParser::from_yaml(path_str)
            .map_err(|e| LookupError::Failed(format!("load {}: {e:?}", path.display())))?;
        Ok(Self { parser })
    }

    pub fn from_bytes(yaml: &[u8]) -> Result<Self, LookupError> {
        let parser =
            UapParser::from_bytes(yaml).map_err(|e| LookupError::Failed(format!("{e:?}")))?;
        Ok(Self { parser })
    }

    fn parse_sync(&self, input: &str) -> Client {
        let parsed = self.parser.parse(input);
        let agent = parsed.user_agent;
        let os = parsed.os;
        let device = parsed.device;

        Client {
            user_agent: UserAgent {
                family: agent.family.to_string(),
                major: agent.major.as_deref().unwrap_or_default().to_string(),
                minor: agent.minor.as_deref().unwrap_or_default().to_string(),
                patch: agent.patch.as_deref().unwrap_or_default().to_string(),
            },
            os: Os {
                family: os.family.to_string(),
                major: os.major.as_deref().unwrap_or_default().to_string(),
                minor: os.minor.as_deref().unwrap_or_default().to_string(),
                patch: os.patch.as_deref().unwrap_or_default().to_string(),
                patch_minor: os.patch_minor.as_deref().unwrap_or_default().to_string(),
            },
            device: Device {
                family: device.family.to_string(),
                brand: device.brand.as_deref().unwrap_or_default().to_string(),
                model: device.model.as_deref().unwrap_or_default().to_string(),
            },
        }
    }
}

#[async_trait]
impl UserAgentParser for UapUserAgentParser {
    async fn parse(&self, user_agent: &str) -> Result<Client, LookupError> {
        if user_agent.trim().is_empty() {
            return Err(LookupError::Failed("empty user agent".to_string()));
        }
        Ok(self.parse_sync(user_agent))
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    const FIREFOX_MAC: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:128.0) Gecko/20100101 Firefox/128.0";
    const CHROME_WINDOWS: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.6478.127 Safari/537.36";
    const SAFARI_IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_5_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 Mobile/15E148 Safari/604.1";
    const CHROME_ANDROID: &str = "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Mobile Safari/537.36";

    pub struct FailingUserAgentParser;

    #[async_trait]
    impl UserAgentParser for FailingUserAgentParser {
        async fn parse(&self, _user_agent: &str) -> Result<Client, LookupError> {
            Err(LookupError::Failed("parser unavailable".to_string()))
        }
    }

    #[tokio::test]
    async fn test_parse_curl() {
        let client = RegexUserAgentParser::new().parse("curl/7.68.0").await.unwrap();
        assert_eq!(client.user_agent.family, "curl");
        assert_eq!(client.user_agent.major, "7");
        assert_eq!(client.user_agent.minor, "68");
        assert_eq!(client.user_agent.patch, "0");
        assert_eq!(client.os.family, "Other");
        assert_eq!(client.device.family, "Other");
    }

    #[tokio::test]
    async fn test_parse_firefox_mac() {
        let client = RegexUserAgentParser::new().parse(FIREFOX_MAC).await.unwrap();
        assert_eq!(client.user_agent.family, "Firefox");
        assert_eq!(client.user_agent.major, "128");
        assert_eq!(client.os.family, "Mac OS X");
        assert_eq!(client.os.major, "10");
        assert_eq!(client.os.minor, "15");
        assert_eq!(client.device.family, "Mac");
        assert_eq!(client.device.brand, "Apple");
    }

    #[tokio::test]
    async fn test_parse_chrome_windows() {
        let client = RegexUserAgentParser::new().parse(CHROME_WINDOWS).await.unwrap();
        assert_eq!(client.user_agent.family, "Chrome");
        assert_eq!(client.user_agent.major, "126");
        assert_eq!(client.user_agent.patch, "6478");
        assert_eq!(client.os.family, "Windows");
        assert_eq!(client.os.major, "10");
    }

    #[tokio::test]
    async fn test_parse_safari_iphone() {
        let client = RegexUserAgentParser::new().parse(SAFARI_IPHONE).await.unwrap();
        assert_eq!(client.user_agent.family, "Safari");
        assert_eq!(client.user_agent.major, "17");
        assert_eq!(client.user_agent.minor, "5");
        assert_eq!(client.os.family, "iOS");
        assert_eq!(client.os.patch, "1");
        assert_eq!(client.device.family, "iPhone");
    }

    #[tokio::test]
    async fn test_parse_chrome_android() {
        let client = RegexUserAgentParser::new().parse(CHROME_ANDROID).await.unwrap();
        assert_eq!(client.user_agent.family, "Chrome");
        assert_eq!(client.os.family, "Android");
        assert_eq!(client.os.major, "14");
        assert_eq!(client.device.family, "Generic Smartphone");
    }

    #[tokio::test]
    async fn test_parse_unknown_is_other() {
        let client = RegexUserAgentParser::new().parse("something odd").await.unwrap();
        assert_eq!(client.user_agent.family, "Other");
        assert_eq!(client.user_agent.major, "");
    }

    #[tokio::test]
    async fn test_parse_empty_fails() {
        let err = RegexUserAgentParser::new().parse("  ").await.unwrap_err();
        assert!(matches!(err, LookupError::Failed(_)));
    }

    const UAP_YAML: &str = r"
user_agent_parsers:
  - regex: '(curl)/(\d+)\.(\d+)\.(\d+)'
  - regex: '(Firefox)/(\d+)\.(\d+)'
os_parsers:
  - regex: 'Mac OS X (\d+)[_.](\d+)'
    os_replacement: 'Mac OS X'
device_parsers:
  - regex: 'Macintosh'
    device_replacement: 'Mac'
    brand_replacement: 'Apple'
    model_replacement: 'Mac'
";

    #[tokio::test]
    async fn test_uap_parser_from_database() {
        let parser = UapUserAgentParser::from_bytes(UAP_YAML.as_bytes()).unwrap();

        let client = parser.parse("curl/7.68.0").await.unwrap();
        assert_eq!(client.user_agent.family, "curl");
        assert_eq!(client.user_agent.major, "7");
        assert_eq!(client.user_agent.patch, "0");
        assert_eq!(client.os.family, "Other");

        let client = parser.parse(FIREFOX_MAC).await.unwrap();
        assert_eq!(client.user_agent.family, "Firefox");
        assert_eq!(client.user_agent.major, "128");
        assert_eq!(client.os.family, "Mac OS X");
        assert_eq!(client.os.minor, "15");
        assert_eq!(client.device.brand, "Apple");
    }

    #[tokio::test]
    async fn test_uap_parser_empty_fails() {
        let parser = UapUserAgentParser::from_bytes(UAP_YAML.as_bytes()).unwrap();
        assert!(parser.parse("").await.is_err());
    }

    #[test]
    fn test_uap_parser_missing_database() {
        let result = UapUserAgentParser::from_yaml(Path::new("/nonexistent/regexes.yaml"));
        assert!(matches!(result, Err(LookupError::Failed(_))));
    }

    #[test]
    fn test_client_wire_names() {
        let client = RegexUserAgentParser::new().parse_sync("Wget/1.21.4");
        let json = serde_json::to_value(&client).unwrap();
        assert_eq!(json["UserAgent"]["Family"], "Wget");
        assert_eq!(json["Os"]["PatchMinor"], "");
        assert_eq!(json["Device"]["Family"], "Other");
    }
}
