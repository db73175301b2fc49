//! Integration tests for the listener.
//!
//! A scripted in-memory connector stands in for the mail server, so these
//! tests exercise the session controller, assembler and handler registry
//! together without network access.

#![allow(clippy::unwrap_used, clippy::similar_names)]

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mailhook::{
    Connector, EmailRecord, Error, FailurePolicy, HandlerFailure, Listener, ListenerConfig,
    MailSession, SessionState, TransportError,
};

/// Server-side state shared between the connector, its sessions and the test.
#[derive(Debug, Default)]
struct Mailbox {
    /// Message id to (raw message, seen flag).
    messages: BTreeMap<u32, (Vec<u8>, bool)>,
    /// Every call made by the listener, in order.
    calls: Vec<String>,
    fail_connect: bool,
    fail_login: bool,
    /// Number of upcoming SELECT calls that fail.
    failing_selects: u32,
    /// Number of upcoming SEARCH calls that fail.
    failing_searches: u32,
    /// FETCH never completes.
    hang_fetch: bool,
}

impl Mailbox {
    fn deliver(&mut self, id: u32, raw: &str) {
        self.messages.insert(id, (raw.as_bytes().to_vec(), false));
    }
}

#[derive(Debug, Clone, Default)]
struct MockConnector {
    mailbox: Arc<Mutex<Mailbox>>,
}

impl MockConnector {
    fn calls(&self) -> Vec<String> {
        self.mailbox.lock().unwrap().calls.clone()
    }

    fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == call).count()
    }
}

struct MockSession {
    mailbox: Arc<Mutex<Mailbox>>,
}

impl Connector for MockConnector {
    type Session = MockSession;

    async fn connect(&self, host: &str, port: u16) -> Result<MockSession, TransportError> {
        let mut mailbox = self.mailbox.lock().unwrap();
        mailbox.calls.push(format!("connect {host}:{port}"));
        if mailbox.fail_connect {
            return Err(TransportError::Other("connection refused".to_string()));
        }
        Ok(MockSession {
            mailbox: Arc::clone(&self.mailbox),
        })
    }
}

impl MailSession for MockSession {
    async fn authenticate(&mut self, user: &str, _secret: &str) -> Result<(), TransportError> {
        let mut mailbox = self.mailbox.lock().unwrap();
        mailbox.calls.push(format!("login {user}"));
        if mailbox.fail_login {
            return Err(TransportError::Other("invalid credentials".to_string()));
        }
        Ok(())
    }

    async fn select(&mut self, name: &str) -> Result<(), TransportError> {
        let mut mailbox = self.mailbox.lock().unwrap();
        mailbox.calls.push(format!("select {name}"));
        if mailbox.failing_selects > 0 {
            mailbox.failing_selects -= 1;
            return Err(TransportError::Other("mailbox unavailable".to_string()));
        }
        Ok(())
    }

    async fn search(&mut self, criterion: &str) -> Result<Vec<u32>, TransportError> {
        let mut mailbox = self.mailbox.lock().unwrap();
        mailbox.calls.push(format!("search {criterion}"));
        if mailbox.failing_searches > 0 {
            mailbox.failing_searches -= 1;
            return Err(TransportError::Other("server busy".to_string()));
        }
        Ok(mailbox
            .messages
            .iter()
            .filter(|(_, (_, seen))| !seen)
            .map(|(id, _)| *id)
            .collect())
    }

    async fn fetch(&mut self, id: u32) -> Result<Vec<u8>, TransportError> {
        let hang = {
            let mut mailbox = self.mailbox.lock().unwrap();
            mailbox.calls.push(format!("fetch {id}"));
            mailbox.hang_fetch
        };
        if hang {
            std::future::pending::<()>().await;
        }

        let mut mailbox = self.mailbox.lock().unwrap();
        let (raw, seen) = mailbox
            .messages
            .get_mut(&id)
            .ok_or_else(|| TransportError::Other(format!("no message {id}")))?;
        *seen = true;
        Ok(raw.clone())
    }

    async fn logout(&mut self) -> Result<(), TransportError> {
        self.mailbox.lock().unwrap().calls.push("logout".to_string());
        Ok(())
    }
}

fn scratch_dir(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("mailhook-it-{name}-{}", std::process::id()))
}

/// Default configuration with a fresh download directory.
fn config(name: &str) -> ListenerConfig {
    let dir = scratch_dir(name);
    let _ = std::fs::remove_dir_all(&dir);
    ListenerConfig::builder("ivan@mail.ru", "secret")
        .download_dir(dir)
        .build()
}

fn simple(subject: &str) -> String {
    format!("From: bank@example.com\r\nSubject: {subject}\r\n\r\nHello\r\n")
}

fn with_attachment(subject: &str, filename: &str) -> String {
    format!(
        "From: bank@example.com\r\n\
         Subject: {subject}\r\n\
         Content-Type: multipart/mixed; boundary=sep\r\n\
         \r\n\
         --sep\r\n\
         Content-Type: text/plain\r\n\
         \r\n\
         See attached\r\n\
         --sep\r\n\
         Content-Type: application/pdf\r\n\
         Content-Disposition: attachment; filename=\"{filename}\"\r\n\
         Content-Transfer-Encoding: base64\r\n\
         \r\n\
         JVBERi0xLjQK\r\n\
         --sep--\r\n"
    )
}

/// Records every email the listener hands out.
fn collect(listener: &mut Listener<MockConnector>) -> Arc<Mutex<Vec<EmailRecord>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    listener.on_new_email(move |email| {
        sink.lock().unwrap().push(email.clone());
        Ok(())
    });
    seen
}

#[tokio::test(start_paused = true)]
async fn test_messages_handled_in_order_with_attachments() {
    let connector = MockConnector::default();
    {
        let mut mailbox = connector.mailbox.lock().unwrap();
        mailbox.deliver(1, &with_attachment("first", "statement.pdf"));
        mailbox.deliver(2, &simple("second"));
    }

    let mut listener = Listener::new(config("ordering"), connector.clone())
        .await
        .unwrap();
    let seen = collect(&mut listener);

    // The attachment of the first message is on disk before the second
    // message reaches any handler.
    let stop = listener.stop_handle();
    listener.on_new_email(move |email| {
        if email.title == "second" {
            let first = std::fs::read(scratch_dir("ordering").join("statement.pdf"))?;
            assert_eq!(first, b"%PDF-1.4\n");
            stop.stop();
        }
        Ok(())
    });

    listener.start(Duration::from_secs(5)).await.unwrap();

    let seen = seen.lock().unwrap();
    let titles: Vec<&str> = seen.iter().map(|e| e.title.as_str()).collect();
    assert_eq!(titles, vec!["first", "second"]);
    assert_eq!(seen[0].body.trim_end(), "See attached");
    assert_eq!(seen[0].attachment_paths.len(), 1);
    assert!(seen[1].attachment_paths.is_empty());

    assert_eq!(
        connector.calls(),
        vec![
            "connect imap.mail.ru:993",
            "login ivan@mail.ru",
            "select INBOX",
            "search UNSEEN",
            "fetch 1",
            "fetch 2",
            "logout",
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_seen_messages_are_not_redelivered() {
    let connector = MockConnector::default();
    connector.mailbox.lock().unwrap().deliver(7, &simple("only once"));

    let mut listener = Listener::new(config("idempotent"), connector.clone())
        .await
        .unwrap();
    let seen = collect(&mut listener);
    let stop = listener.stop_handle();

    let (result, ()) = tokio::join!(listener.start(Duration::from_secs(5)), async {
        // Three cycles: t=0, t=5, t=10.
        tokio::time::sleep(Duration::from_secs(12)).await;
        stop.stop();
    });

    result.unwrap();
    assert_eq!(seen.lock().unwrap().len(), 1);
    assert_eq!(connector.count("search UNSEEN"), 3);
    assert_eq!(connector.count("fetch 7"), 1);
    assert_eq!(connector.count("logout"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_during_sleep_skips_next_cycle() {
    let connector = MockConnector::default();
    let listener = Listener::new(config("stop-sleep"), connector.clone())
        .await
        .unwrap();
    let stop = listener.stop_handle();

    let started = tokio::time::Instant::now();
    let (result, ()) = tokio::join!(listener.start(Duration::from_secs(3600)), async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        stop.stop();
    });

    result.unwrap();
    assert_eq!(started.elapsed(), Duration::from_secs(1));
    assert_eq!(connector.count("search UNSEEN"), 1);
    assert_eq!(connector.calls().last().unwrap(), "logout");
}

#[tokio::test(start_paused = true)]
async fn test_stop_mid_cycle_finishes_cycle() {
    let connector = MockConnector::default();
    {
        let mut mailbox = connector.mailbox.lock().unwrap();
        mailbox.deliver(1, &simple("one"));
        mailbox.deliver(2, &simple("two"));
    }

    let mut listener = Listener::new(config("stop-mid"), connector.clone())
        .await
        .unwrap();
    let stop = listener.stop_handle();
    listener.on_new_email(move |_| {
        stop.stop();
        Ok(())
    });
    let seen = collect(&mut listener);

    listener.start(Duration::from_secs(5)).await.unwrap();

    assert_eq!(seen.lock().unwrap().len(), 2);
    assert_eq!(connector.count("search UNSEEN"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_interrupt_reports_user_stop() {
    let connector = MockConnector::default();
    let listener = Listener::new(config("interrupt"), connector.clone())
        .await
        .unwrap();
    let handle = listener.stop_handle();
    let mut state = listener.state();

    let (result, ()) = tokio::join!(listener.start(Duration::from_secs(5)), async {
        tokio::time::sleep(Duration::from_secs(2)).await;
        handle.interrupt();
    });

    assert!(matches!(result, Err(Error::UserStopped)));
    assert_eq!(connector.calls().last().unwrap(), "logout");
    assert_eq!(*state.borrow_and_update(), SessionState::Stopped);
}

#[tokio::test]
async fn test_unknown_charset_stops_after_earlier_message() {
    let connector = MockConnector::default();
    {
        let mut mailbox = connector.mailbox.lock().unwrap();
        mailbox.deliver(1, &simple("fine"));
        mailbox.deliver(2, "Subject: =?x-martian?B?cWFwbGE=?=\r\n\r\nbody\r\n");
    }

    let mut listener = Listener::new(config("charset"), connector.clone())
        .await
        .unwrap();
    let seen = collect(&mut listener);

    let err = listener.start(Duration::from_secs(5)).await.unwrap_err();

    assert!(matches!(err, Error::Decode(_)));
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].title, "fine");
    assert_eq!(connector.calls().last().unwrap(), "logout");
}

#[tokio::test]
async fn test_connect_failure_skips_logout() {
    let connector = MockConnector::default();
    connector.mailbox.lock().unwrap().fail_connect = true;

    let listener = Listener::new(config("connect"), connector.clone())
        .await
        .unwrap();
    let state = listener.state();

    let err = listener.start(Duration::from_secs(5)).await.unwrap_err();

    assert!(matches!(err, Error::Connection(_)));
    assert_eq!(connector.calls(), vec!["connect imap.mail.ru:993"]);
    assert_eq!(*state.borrow(), SessionState::Stopped);
}

#[tokio::test]
async fn test_login_failure_still_logs_out() {
    let connector = MockConnector::default();
    connector.mailbox.lock().unwrap().fail_login = true;

    let listener = Listener::new(config("login"), connector.clone())
        .await
        .unwrap();

    let err = listener.start(Duration::from_secs(5)).await.unwrap_err();

    assert!(matches!(err, Error::Authentication(_)));
    assert_eq!(
        connector.calls(),
        vec!["connect imap.mail.ru:993", "login ivan@mail.ru", "logout"]
    );
}

#[tokio::test]
async fn test_search_failure_aborts_by_default() {
    let connector = MockConnector::default();
    connector.mailbox.lock().unwrap().failing_searches = 1;

    let listener = Listener::new(config("abort"), connector.clone())
        .await
        .unwrap();

    let err = listener.start(Duration::from_secs(5)).await.unwrap_err();

    assert!(matches!(err, Error::Search(_)));
    assert_eq!(connector.count("search UNSEEN"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_search_failure_retried_under_retry_policy() {
    let connector = MockConnector::default();
    {
        let mut mailbox = connector.mailbox.lock().unwrap();
        mailbox.failing_searches = 2;
        mailbox.deliver(3, &simple("after retries"));
    }

    let mut config = config("retry");
    config.failure_policy = FailurePolicy::Retry {
        attempts: 2,
        backoff: Duration::from_millis(100),
    };

    let mut listener = Listener::new(config, connector.clone()).await.unwrap();
    let stop = listener.stop_handle();
    listener.on_new_email(move |_| {
        stop.stop();
        Ok(())
    });

    listener.start(Duration::from_secs(5)).await.unwrap();

    assert_eq!(connector.count("search UNSEEN"), 3);
    assert_eq!(connector.count("fetch 3"), 1);
}

#[tokio::test]
async fn test_handler_failure_modes() {
    // (mode, run ends in error, runs of the handler after the failing one)
    for (mode, expect_error, later_runs) in [
        (HandlerFailure::Propagate, true, 0),
        (HandlerFailure::Isolate, false, 1),
    ] {
        let connector = MockConnector::default();
        connector.mailbox.lock().unwrap().deliver(1, &simple("x"));

        let mut config = config(&format!("handler-{mode:?}"));
        config.handler_failure = mode;

        let mut listener = Listener::new(config, connector.clone()).await.unwrap();
        let runs = Arc::new(AtomicUsize::new(0));

        listener.on_new_email(|_| anyhow::bail!("webhook unreachable"));
        let counter = Arc::clone(&runs);
        let stop = listener.stop_handle();
        listener.on_new_email(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            stop.stop();
            Ok(())
        });

        let result = listener.start(Duration::from_secs(5)).await;

        assert_eq!(result.is_err(), expect_error, "{mode:?}");
        if let Err(err) = result {
            assert!(matches!(err, Error::Handler { index: 0, .. }));
        }
        assert_eq!(runs.load(Ordering::SeqCst), later_runs, "{mode:?}");
    }
}

#[tokio::test]
async fn test_unusable_download_dir() {
    let file = std::env::temp_dir().join(format!("mailhook-it-file-{}", std::process::id()));
    std::fs::write(&file, b"not a directory").unwrap();

    let config = ListenerConfig::builder("ivan@mail.ru", "secret")
        .download_dir(&file)
        .build();
    let err = Listener::new(config, MockConnector::default())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::DownloadDir { ref path, .. } if path == &file));
}

#[tokio::test]
async fn test_invalid_config_rejected() {
    let config = ListenerConfig::builder("", "secret")
        .download_dir(scratch_dir("invalid"))
        .build();
    let err = Listener::new(config, MockConnector::default())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Config(_)));
}

#[tokio::test]
async fn test_stop_before_start_applies_once() {
    let connector = MockConnector::default();
    let listener = Listener::new(config("restart"), connector.clone())
        .await
        .unwrap();
    let stop = listener.stop_handle();
    stop.stop();

    listener.start(Duration::from_secs(5)).await.unwrap();
    assert!(connector.calls().is_empty());
    assert_eq!(*listener.state().borrow(), SessionState::Stopped);

    // The request was consumed, so a second run reaches the server.
    connector.mailbox.lock().unwrap().deliver(1, &simple("again"));
    let mut listener = listener;
    listener.on_new_email(move |_| {
        stop.stop();
        Ok(())
    });
    listener.start(Duration::from_secs(5)).await.unwrap();

    assert_eq!(connector.count("fetch 1"), 1);
    assert_eq!(connector.calls().last().unwrap(), "logout");
}

#[tokio::test(start_paused = true)]
async fn test_interrupt_abandons_hung_fetch() {
    let connector = MockConnector::default();
    {
        let mut mailbox = connector.mailbox.lock().unwrap();
        mailbox.deliver(1, &simple("never arrives"));
        mailbox.hang_fetch = true;
    }

    let mut listener = Listener::new(config("hung"), connector.clone())
        .await
        .unwrap();
    let seen = collect(&mut listener);
    let handle = listener.stop_handle();

    let started = tokio::time::Instant::now();
    let (result, ()) = tokio::join!(listener.start(Duration::from_secs(5)), async {
        tokio::time::sleep(Duration::from_secs(2)).await;
        handle.interrupt();
    });

    assert!(matches!(result, Err(Error::UserStopped)));
    assert_eq!(started.elapsed(), Duration::from_secs(2));
    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(connector.calls().last().unwrap(), "logout");
}

#[tokio::test]
async fn test_select_failure_reports_mailbox_and_logs_out() {
    let connector = MockConnector::default();
    connector.mailbox.lock().unwrap().failing_selects = 1;

    let listener = Listener::new(config("select"), connector.clone())
        .await
        .unwrap();

    let err = listener.start(Duration::from_secs(5)).await.unwrap_err();

    assert!(matches!(err, Error::Mailbox { ref mailbox, .. } if mailbox == "INBOX"));
    assert_eq!(
        connector.calls(),
        vec![
            "connect imap.mail.ru:993",
            "login ivan@mail.ru",
            "select INBOX",
            "logout",
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_select_failure_retried_under_retry_policy() {
    let connector = MockConnector::default();
    {
        let mut mailbox = connector.mailbox.lock().unwrap();
        mailbox.failing_selects = 1;
        mailbox.deliver(4, &simple("selected late"));
    }

    let mut config = config("select-retry");
    config.failure_policy = FailurePolicy::Retry {
        attempts: 1,
        backoff: Duration::from_millis(250),
    };

    let mut listener = Listener::new(config, connector.clone()).await.unwrap();
    let stop = listener.stop_handle();
    listener.on_new_email(move |_| {
        stop.stop();
        Ok(())
    });

    listener.start(Duration::from_secs(5)).await.unwrap();

    assert_eq!(connector.count("select INBOX"), 2);
    assert_eq!(connector.count("fetch 4"), 1);
}

#[tokio::test]
async fn test_fetch_failure_names_message() {
    let connector = MockConnector::default();
    {
        let mut mailbox = connector.mailbox.lock().unwrap();
        mailbox.deliver(5, &simple("ok"));
        // Listed by SEARCH but gone by the time it is fetched.
        mailbox.deliver(6, &simple("expunged"));
    }

    let mut listener = Listener::new(config("fetch"), connector.clone())
        .await
        .unwrap();
    let mailbox = Arc::clone(&connector.mailbox);
    listener.on_new_email(move |_| {
        mailbox.lock().unwrap().messages.remove(&6);
        Ok(())
    });

    let err = listener.start(Duration::from_secs(5)).await.unwrap_err();

    assert!(matches!(err, Error::Fetch { id: 6, .. }));
    assert_eq!(connector.calls().last().unwrap(), "logout");
}

#[tokio::test]
async fn test_attachment_write_failure_ends_run() {
    let connector = MockConnector::default();
    connector
        .mailbox
        .lock()
        .unwrap()
        .deliver(1, &with_attachment("statement", "march.pdf"));

    let mut listener = Listener::new(config("write"), connector.clone())
        .await
        .unwrap();
    let seen = collect(&mut listener);

    // Replace the download directory with a plain file.
    let dir = scratch_dir("write");
    std::fs::remove_dir_all(&dir).unwrap();
    std::fs::write(&dir, b"in the way").unwrap();

    let err = listener.start(Duration::from_secs(5)).await.unwrap_err();

    let expected = dir.join("march.pdf");
    assert!(matches!(err, Error::AttachmentWrite { ref path, .. } if path == &expected));
    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(connector.calls().last().unwrap(), "logout");
    std::fs::remove_file(&dir).unwrap();
}
