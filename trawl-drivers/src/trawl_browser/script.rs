//! The browser automation pipeline.
//!
//! A fetch is a flat list of [`Step`]s executed in order against an
//! [`AutomationPage`]. The first failing step aborts the run; every step is
//! awaited through the fetch's [`FetchScope`] so the shared deadline and the
//! caller's cancellation apply throughout.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};
use trawl_common::{DriverOptions, FetchError, Phase, ResolvedCookie};
use trawl_runtime::FetchScope;
use url::Url;

use crate::trawl_browser::page::AutomationPage;

/// Upper bound on tearing down a page target.
pub const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    EnableNetwork,
    ApplyCookies(Vec<ResolvedCookie>),
    ApplyHeaders(Vec<(String, String)>),
    Navigate(String),
    Settle(Duration),
    Click { xpath: String, settle: Duration },
    Extract,
}

impl Step {
    pub fn phase(&self) -> Phase {
        match self {
            Step::EnableNetwork => Phase::EnableNetwork,
            Step::ApplyCookies(_) => Phase::Cookies,
            Step::ApplyHeaders(_) => Phase::Headers,
            Step::Navigate(_) => Phase::Navigate,
            Step::Settle(_) => Phase::Settle,
            Step::Click { .. } => Phase::Interact,
            Step::Extract => Phase::Extract,
        }
    }
}

/// Build the step list for one fetch. Clicks with an empty XPath are dropped.
pub fn build_script(url: &Url, opts: &DriverOptions, cookies: Vec<ResolvedCookie>) -> Vec<Step> {
    let mut steps = vec![
        Step::EnableNetwork,
        Step::ApplyCookies(cookies),
        Step::ApplyHeaders(opts.effective_headers()),
        Step::Navigate(url.to_string()),
        Step::Settle(opts.settle_duration()),
    ];
    steps.extend(
        opts.clicks
            .iter()
            .filter(|c| !c.xpath.trim().is_empty())
            .map(|c| Step::Click {
                xpath: c.xpath.clone(),
                settle: c.settle_duration(),
            }),
    );
    steps.push(Step::Extract);
    steps
}

/// Run `steps` and return the extracted markup.
pub async fn run_script<P>(page: &P, steps: &[Step], scope: &FetchScope) -> Result<String, FetchError>
where
    P: AutomationPage + ?Sized,
{
    let mut html = None;
    for step in steps {
        let phase = step.phase();
        debug!(target: "trawl::browser", %phase, "browser.step");
        match step {
            Step::EnableNetwork => {
                scope
                    .run(async { page.enable_network().await.map_err(|e| e.at(phase)) })
                    .await?
            }
            Step::ApplyCookies(cookies) => {
                scope
                    .run(async { page.set_cookies(cookies).await.map_err(|e| e.at(phase)) })
                    .await?;
                log_cookies(page, scope, "cookies found").await;
            }
            Step::ApplyHeaders(headers) => {
                scope
                    .run(async { page.set_extra_headers(headers).await.map_err(|e| e.at(phase)) })
                    .await?
            }
            Step::Navigate(url) => {
                scope
                    .run(async { page.navigate(url).await.map_err(|e| e.at(phase)) })
                    .await?
            }
            Step::Settle(d) => scope.sleep(*d).await?,
            Step::Click { xpath, settle } => {
                let found = scope
                    .run(async { page.click_first_match(xpath).await.map_err(|e| e.at(phase)) })
                    .await?;
                if found == 0 {
                    debug!(target: "trawl::browser", %xpath, "click target not found, skipping");
                    continue;
                }
                debug!(target: "trawl::browser", %xpath, matches = found, "clicked");
                scope.sleep(*settle).await?;
            }
            Step::Extract => {
                let markup = scope
                    .run(async { page.outer_html().await.map_err(|e| e.at(phase)) })
                    .await?;
                log_cookies(page, scope, "cookies set").await;
                html = Some(markup);
            }
        }
    }
    html.ok_or_else(|| FetchError::automation(Phase::Extract, "script has no extract step"))
}

/// Run `steps`, then close the page whatever the outcome.
pub async fn execute<P>(page: &P, steps: &[Step], scope: &FetchScope) -> Result<String, FetchError>
where
    P: AutomationPage + ?Sized,
{
    let outcome = run_script(page, steps, scope).await;
    if let Err(err) = &outcome {
        debug!(target: "trawl::browser", error=%err, "script aborted");
    }
    match tokio::time::timeout(TEARDOWN_TIMEOUT, page.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(target: "trawl::browser", error=%e, "page close failed"),
        Err(_) => warn!(target: "trawl::browser", "page close timed out"),
    }
    outcome
}

/// Open a page with `open`, then [`execute`] `steps` on it.
///
/// Page creation is bounded by [`TEARDOWN_TIMEOUT`] instead of the fetch
/// scope: a target the browser already created must come back so it can be
/// closed. If the scope ran out meanwhile, the first step reports it and the
/// page is still closed.
pub async fn open_and_execute<P, F>(
    open: F,
    steps: &[Step],
    scope: &FetchScope,
) -> Result<String, FetchError>
where
    P: AutomationPage,
    F: Future<Output = Result<P, FetchError>>,
{
    let page = match tokio::time::timeout(TEARDOWN_TIMEOUT, open).await {
        Ok(page) => page?,
        Err(_) => {
            return Err(FetchError::automation(
                Phase::Connect,
                "timed out opening a page target",
            ));
        }
    };
    execute(&page, steps, scope).await
}

async fn log_cookies<P>(page: &P, scope: &FetchScope, label: &str)
where
    P: AutomationPage + ?Sized,
{
    match scope
        .run(async { page.cookie_names().await.map_err(|e| e.at(Phase::Cookies)) })
        .await
    {
        Ok(names) => debug!(target: "trawl::cookies", cookies=?names, "{label}"),
        Err(e) => debug!(target: "trawl::cookies", error=%e, "could not read browser cookies"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trawl_browser::error::BrowserError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;
    use trawl_common::{resolve_cookies, ClickAction, CookieGroup, CookieSpec, HeaderSpec};
    use trawl_runtime::CancellationToken;

    /// Page double recording calls, with scripted match counts and failures.
    #[derive(Default)]
    struct ScriptedPage {
        calls: Arc<Mutex<Vec<String>>>,
        cookies_sent: Mutex<Vec<ResolvedCookie>>,
        headers_sent: Mutex<Vec<(String, String)>>,
        matches: HashMap<String, usize>,
        fail_on: Option<&'static str>,
    }

    impl ScriptedPage {
        fn record(&self, call: impl Into<String>) -> Result<(), BrowserError> {
            let call = call.into();
            let failing = self.fail_on.is_some_and(|f| call.starts_with(f));
            self.calls.lock().unwrap().push(call);
            if failing {
                return Err(BrowserError::Cdp("scripted failure".into()));
            }
            Ok(())
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AutomationPage for ScriptedPage {
        async fn enable_network(&self) -> Result<(), BrowserError> {
            self.record("enable_network")
        }
        async fn set_cookies(&self, cookies: &[ResolvedCookie]) -> Result<(), BrowserError> {
            self.cookies_sent.lock().unwrap().extend_from_slice(cookies);
            self.record(format!("set_cookies:{}", cookies.len()))
        }
        async fn set_extra_headers(&self, headers: &[(String, String)]) -> Result<(), BrowserError> {
            self.headers_sent.lock().unwrap().extend_from_slice(headers);
            self.record(format!("set_extra_headers:{}", headers.len()))
        }
        async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
            self.record(format!("navigate:{url}"))
        }
        async fn click_first_match(&self, xpath: &str) -> Result<usize, BrowserError> {
            self.record(format!("search:{xpath}"))?;
            let found = self.matches.get(xpath).copied().unwrap_or(0);
            if found > 0 {
                self.record(format!("click:{xpath}"))?;
            }
            Ok(found)
        }
        async fn outer_html(&self) -> Result<String, BrowserError> {
            self.record("outer_html")?;
            Ok("<html><body>rendered</body></html>".into())
        }
        async fn cookie_names(&self) -> Result<Vec<String>, BrowserError> {
            Ok(vec![])
        }
        async fn close(&self) -> Result<(), BrowserError> {
            self.record("close")
        }
    }

    fn url() -> Url {
        Url::parse("http://site.test/list").unwrap()
    }

    fn scope(cancel: &CancellationToken) -> FetchScope {
        FetchScope::new(cancel, Duration::from_secs(60))
    }

    #[test]
    fn script_follows_pipeline_order() {
        let opts = DriverOptions {
            use_browser: true,
            sleep: 3,
            headers: vec![HeaderSpec::new("Referer", "http://site.test/")],
            clicks: vec![
                ClickAction {
                    xpath: "//button[@id='more']".into(),
                    sleep: 0,
                },
                ClickAction {
                    xpath: "  ".into(),
                    sleep: 5,
                },
            ],
            ..Default::default()
        };
        let steps = build_script(&url(), &opts, vec![]);
        assert_eq!(
            steps,
            vec![
                Step::EnableNetwork,
                Step::ApplyCookies(vec![]),
                Step::ApplyHeaders(vec![("Referer".into(), "http://site.test/".into())]),
                Step::Navigate("http://site.test/list".into()),
                Step::Settle(Duration::from_secs(3)),
                Step::Click {
                    xpath: "//button[@id='more']".into(),
                    settle: Duration::from_secs(2),
                },
                Step::Extract,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn settles_for_configured_duration_without_clicks() {
        let opts = DriverOptions {
            use_browser: true,
            sleep: 1,
            ..Default::default()
        };
        let page = ScriptedPage::default();
        let cancel = CancellationToken::new();
        let started = Instant::now();

        let html = execute(&page, &build_script(&url(), &opts, vec![]), &scope(&cancel))
            .await
            .unwrap();

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(1));
        assert!(elapsed < Duration::from_secs(2));
        assert_eq!(html, "<html><body>rendered</body></html>");
        assert_eq!(
            page.calls(),
            vec![
                "enable_network",
                "set_cookies:0",
                "set_extra_headers:0",
                "navigate:http://site.test/list",
                "outer_html",
                "close",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn configured_cookies_and_merged_headers_precede_navigation() {
        let opts = DriverOptions {
            use_browser: true,
            headers: vec![
                HeaderSpec::new("User-Agent", "first/1.0"),
                HeaderSpec::new("Referer", "http://site.test/"),
                HeaderSpec::new("user-agent", "second/2.0"),
            ],
            cookies: vec![CookieGroup {
                cookie_url: Some("http://site.test/".into()),
                cookies: vec![
                    CookieSpec {
                        name: "sid".into(),
                        value: "42".into(),
                        domain: "site.test".into(),
                        ..Default::default()
                    },
                    CookieSpec {
                        name: "visitor".into(),
                        value_random: 12,
                        ..Default::default()
                    },
                ],
            }],
            ..Default::default()
        };
        let cookies = resolve_cookies(&opts.cookies, &url()).unwrap();
        let page = ScriptedPage::default();
        let cancel = CancellationToken::new();

        execute(&page, &build_script(&url(), &opts, cookies), &scope(&cancel))
            .await
            .unwrap();

        let sent = page.cookies_sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 2);
        assert_eq!((sent[0].name.as_str(), sent[0].value.as_str()), ("sid", "42"));
        assert_eq!(sent[0].domain, "site.test");
        assert_eq!(sent[1].name, "visitor");
        assert_eq!(sent[1].value.len(), 12);
        assert!(sent.iter().all(|c| c.cookie_url.as_str() == "http://site.test/"));

        assert_eq!(
            *page.headers_sent.lock().unwrap(),
            vec![
                ("user-agent".to_string(), "second/2.0".to_string()),
                ("Referer".to_string(), "http://site.test/".to_string()),
            ]
        );

        let calls = page.calls();
        let at = |call: &str| calls.iter().position(|c| c == call).unwrap();
        let navigate = at("navigate:http://site.test/list");
        assert!(at("set_cookies:2") < navigate);
        assert!(at("set_extra_headers:2") < navigate);
    }

    #[tokio::test(start_paused = true)]
    async fn click_without_matches_is_skipped() {
        let opts = DriverOptions {
            use_browser: true,
            clicks: vec![ClickAction {
                xpath: "//a[@class='missing']".into(),
                sleep: 10,
            }],
            ..Default::default()
        };
        let page = ScriptedPage::default();
        let cancel = CancellationToken::new();
        let started = Instant::now();

        let html = execute(&page, &build_script(&url(), &opts, vec![]), &scope(&cancel)).await;

        assert!(html.is_ok());
        assert!(started.elapsed() < Duration::from_secs(3));
        let calls = page.calls();
        assert!(calls.contains(&"search://a[@class='missing']".to_string()));
        assert!(!calls.iter().any(|c| c.starts_with("click:")));
    }

    #[tokio::test(start_paused = true)]
    async fn matched_click_runs_then_settles() {
        let xpath = "//button[@id='more']".to_string();
        let page = ScriptedPage {
            matches: HashMap::from([(xpath.clone(), 3)]),
            ..Default::default()
        };
        let opts = DriverOptions {
            use_browser: true,
            sleep: 1,
            clicks: vec![ClickAction {
                xpath: xpath.clone(),
                sleep: 4,
            }],
            ..Default::default()
        };
        let cancel = CancellationToken::new();
        let started = Instant::now();

        execute(&page, &build_script(&url(), &opts, vec![]), &scope(&cancel))
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_secs(5));
        let calls = page.calls();
        let searches: Vec<_> = calls.iter().filter(|c| c.starts_with("search:")).collect();
        assert_eq!(searches, vec![&format!("search:{xpath}")]);
        let search = calls.iter().position(|c| c == &format!("search:{xpath}")).unwrap();
        let click = calls.iter().position(|c| c == &format!("click:{xpath}")).unwrap();
        assert_eq!(click, search + 1);
        let extract = calls.iter().position(|c| c == "outer_html").unwrap();
        assert!(click < extract);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_step_aborts_with_its_phase_and_still_closes() {
        let page = ScriptedPage {
            fail_on: Some("navigate"),
            ..Default::default()
        };
        let cancel = CancellationToken::new();
        let opts = DriverOptions {
            use_browser: true,
            ..Default::default()
        };

        let err = execute(&page, &build_script(&url(), &opts, vec![]), &scope(&cancel))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            FetchError::Automation {
                phase: Phase::Navigate,
                ..
            }
        ));
        let calls = page.calls();
        assert!(!calls.contains(&"outer_html".to_string()));
        assert_eq!(calls.last().map(String::as_str), Some("close"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_settle_still_closes() {
        let page = ScriptedPage::default();
        let cancel = CancellationToken::new();
        let opts = DriverOptions {
            use_browser: true,
            sleep: 30,
            ..Default::default()
        };
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let err = execute(&page, &build_script(&url(), &opts, vec![]), &scope(&cancel))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Cancelled));
        assert_eq!(page.calls().last().map(String::as_str), Some("close"));
    }

    #[tokio::test(start_paused = true)]
    async fn budget_expiry_during_clicks_times_out() {
        let xpath = "//a".to_string();
        let page = ScriptedPage {
            matches: HashMap::from([(xpath.clone(), 1)]),
            ..Default::default()
        };
        let opts = DriverOptions {
            use_browser: true,
            sleep: 40,
            clicks: vec![ClickAction { xpath, sleep: 40 }],
            ..Default::default()
        };
        let cancel = CancellationToken::new();

        let err = execute(&page, &build_script(&url(), &opts, vec![]), &scope(&cancel))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Timeout(d) if d == Duration::from_secs(60)));
        assert_eq!(page.calls().last().map(String::as_str), Some("close"));
    }

    #[tokio::test(start_paused = true)]
    async fn page_opened_after_deadline_is_still_closed() {
        let page = ScriptedPage::default();
        let calls = page.calls.clone();
        let cancel = CancellationToken::new();
        let scope = FetchScope::new(&cancel, Duration::from_secs(1));
        let opts = DriverOptions {
            use_browser: true,
            ..Default::default()
        };
        let open = async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Ok(page)
        };

        let err = open_and_execute(open, &build_script(&url(), &opts, vec![]), &scope)
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Timeout(d) if d == Duration::from_secs(1)));
        assert_eq!(*calls.lock().unwrap(), vec!["close".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_page_creation_gives_up_after_teardown_bound() {
        let cancel = CancellationToken::new();
        let started = Instant::now();
        let open = std::future::pending::<Result<ScriptedPage, FetchError>>();

        let err = open_and_execute(open, &[Step::Extract], &scope(&cancel))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            FetchError::Automation {
                phase: Phase::Connect,
                ..
            }
        ));
        let elapsed = started.elapsed();
        assert!(elapsed >= TEARDOWN_TIMEOUT);
        assert!(elapsed < TEARDOWN_TIMEOUT + Duration::from_secs(1));
    }
}
