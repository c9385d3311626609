use serial_test::serial;
use std::{fs, path::PathBuf};
use tempfile::TempDir;
use trawl_common::DEFAULT_SETTLE;
use trawl_config::TrawlConfigLoader;

/// Helper to write a YAML file in a temp dir and return its path.
fn write_yaml(tmp: &TempDir, name: &str, yaml: &str) -> PathBuf {
    let p = tmp.path().join(name);
    fs::write(&p, yaml).expect("write yaml");
    p
}

const FILE_YAML: &str = r#"
version: "1"
settings:
  verify_tls: true
  user_agent: "${SITE_USER_AGENT}"
sources:
  news:
    driver:
      use_browser: true
      sleep: 3
      headers:
        - key: "Accept-Language"
          value: "en"
      cookies:
        - cookie_url: "https://news.example.test/"
          cookies:
            - name: "consent"
              value: "yes"
              domain: "example.test"
            - name: "visitor"
              value_random: 16
      clicks:
        - xpath: "//button[@id='more']"
  plain:
    driver:
      use_browser: false
"#;

#[test]
#[serial]
fn loads_file_with_env_expansion() {
    let tmp = TempDir::new().unwrap();
    let p = write_yaml(&tmp, "trawl.yaml", FILE_YAML);

    let config = temp_env::with_var("SITE_USER_AGENT", Some("TestAgent/1.0"), || {
        TrawlConfigLoader::new()
            .with_file(&p)
            .load()
            .expect("load config")
    });

    assert_eq!(config.version.as_deref(), Some("1"));
    assert_eq!(config.settings.user_agent, "TestAgent/1.0");
    assert!(config.settings.verify_tls);
    assert!(config.settings.browser_endpoint.is_empty());

    let news = config.source("news").expect("news source");
    assert!(news.uses_browser());
    assert_eq!(
        news.headers(),
        vec![("Accept-Language".to_string(), "en".to_string())]
    );
    assert_eq!(news.cookies().len(), 1);
    assert_eq!(news.cookies()[0].cookies[1].value_random, 16);

    let driver = news.driver.as_ref().unwrap();
    assert_eq!(driver.clicks.len(), 1);
    assert_eq!(driver.clicks[0].settle_duration(), DEFAULT_SETTLE);

    let plain = config.source("plain").expect("plain source");
    assert!(!plain.uses_browser());
}

#[test]
#[serial]
fn environment_overrides_file_values() {
    let tmp = TempDir::new().unwrap();
    let p = write_yaml(&tmp, "trawl.yaml", FILE_YAML);

    let config = temp_env::with_vars(
        [
            ("SITE_USER_AGENT", Some("TestAgent/1.0")),
            ("TRAWL__SETTINGS__VERIFY_TLS", Some("false")),
            (
                "TRAWL__SETTINGS__BROWSER_ENDPOINT",
                Some("ws://127.0.0.1:9222/devtools/browser/abc"),
            ),
        ],
        || TrawlConfigLoader::new().with_file(&p).load().expect("load config"),
    );

    assert!(!config.settings.verify_tls);
    assert_eq!(
        config.settings.browser_endpoint,
        "ws://127.0.0.1:9222/devtools/browser/abc"
    );
    assert_eq!(
        config.source("news").unwrap().driver.as_ref().unwrap().sleep,
        3
    );
}

#[test]
#[serial]
fn missing_optional_file_falls_back_to_defaults() {
    let tmp = TempDir::new().unwrap();
    let config = TrawlConfigLoader::new()
        .with_optional_file(tmp.path().join("absent.yaml"))
        .load()
        .expect("defaults");
    assert!(config.settings.verify_tls);
    assert!(config.sources.is_empty());
}

#[test]
#[serial]
fn missing_required_file_is_an_error() {
    let tmp = TempDir::new().unwrap();
    assert!(
        TrawlConfigLoader::new()
            .with_file(tmp.path().join("absent.yaml"))
            .load()
            .is_err()
    );
}
