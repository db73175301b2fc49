//! Integration tests for the IMAP client.
//!
//! These tests use a mock stream to simulate IMAP server responses
//! without requiring a real server connection.

use std::io::{self, Cursor};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use mailhook_imap::{Client, Error, Response, ResponseParser, Status, UntaggedResponse};

/// Mock stream that replays a scripted server side and records what the
/// client sends.
struct MockStream {
    /// Responses to return (in order).
    responses: Cursor<Vec<u8>>,
    /// Captured commands sent by the client.
    sent: Arc<Mutex<Vec<u8>>>,
}

impl MockStream {
    fn new(responses: &[u8]) -> (Self, Arc<Mutex<Vec<u8>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let stream = Self {
            responses: Cursor::new(responses.to_vec()),
            sent: Arc::clone(&sent),
        };
        (stream, sent)
    }
}

impl AsyncRead for MockStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let data = self.responses.get_ref();
        let pos = usize::try_from(self.responses.position()).unwrap_or(usize::MAX);

        if pos >= data.len() {
            return Poll::Ready(Ok(()));
        }

        let remaining = &data[pos..];
        let to_read = remaining.len().min(buf.remaining());
        buf.put_slice(&remaining[..to_read]);
        self.responses.set_position((pos + to_read) as u64);

        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MockStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.sent.lock().unwrap().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

fn sent_text(sent: &Arc<Mutex<Vec<u8>>>) -> String {
    String::from_utf8_lossy(&sent.lock().unwrap()).into_owned()
}

#[tokio::test]
async fn test_full_polling_session() {
    let message = "From: =?utf-8?B?0JjQstCw0L0=?= <ivan@example.com>\r\n\
                   Subject: Invoice\r\n\
                   \r\n\
                   Please find attached.\r\n";
    let script = format!(
        "* OK [CAPABILITY IMAP4rev1 AUTH=PLAIN] mail.ru ready\r\n\
         A0000 OK [CAPABILITY IMAP4rev1 IDLE] Authentication successful\r\n\
         * FLAGS (\\Answered \\Flagged \\Deleted \\Seen \\Draft)\r\n\
         * 4 EXISTS\r\n\
         * 1 RECENT\r\n\
         A0001 OK [READ-WRITE] SELECT completed\r\n\
         * SEARCH 4\r\n\
         A0002 OK SEARCH completed\r\n\
         * 4 FETCH (RFC822 {{{len}}}\r\n{message} FLAGS (\\Seen))\r\n\
         A0003 OK FETCH completed\r\n\
         * BYE IMAP4rev1 Server logging out\r\n\
         A0004 OK LOGOUT completed\r\n",
        len = message.len(),
    );

    let (stream, sent) = MockStream::new(script.as_bytes());

    let client = Client::from_stream(stream).await.unwrap();
    assert!(client.has_capability("AUTH=PLAIN"));

    let client = client.login("ivan@mail.ru", "app password").await.unwrap();
    let mut inbox = client.select("INBOX").await.unwrap();
    assert_eq!(inbox.exists(), 4);

    let ids = inbox.search("UNSEEN").await.unwrap();
    assert_eq!(ids, vec![4]);

    let raw = inbox.fetch_rfc822(4).await.unwrap();
    assert_eq!(raw, message.as_bytes());

    inbox.logout().await.unwrap();

    assert_eq!(
        sent_text(&sent),
        "A0000 LOGIN ivan@mail.ru \"app password\"\r\n\
         A0001 SELECT INBOX\r\n\
         A0002 SEARCH UNSEEN\r\n\
         A0003 FETCH 4 RFC822\r\n\
         A0004 LOGOUT\r\n"
    );
}

#[tokio::test]
async fn test_empty_search_result() {
    let script = b"* OK ready\r\n\
                   A0000 OK logged in\r\n\
                   * 0 EXISTS\r\n\
                   A0001 OK selected\r\n\
                   * SEARCH\r\n\
                   A0002 OK SEARCH completed\r\n";

    let (stream, _sent) = MockStream::new(script);

    let client = Client::from_stream(stream).await.unwrap();
    let client = client.login("user", "pass").await.unwrap();
    let mut inbox = client.select("INBOX").await.unwrap();

    assert!(inbox.search("UNSEEN").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_connection_dropped_mid_command() {
    let script = b"* OK ready\r\n\
                   A0000 OK logged in\r\n\
                   * 2 EXISTS\r\n";

    let (stream, _sent) = MockStream::new(script);

    let client = Client::from_stream(stream).await.unwrap();
    let client = client.login("user", "pass").await.unwrap();
    let err = client.select("INBOX").await.unwrap_err();

    assert!(matches!(err.error, Error::Io(ref e) if e.kind() == io::ErrorKind::UnexpectedEof));
}

#[tokio::test]
async fn test_server_bye_on_command() {
    let script = b"* OK ready\r\n\
                   * BYE Autologout; idle for too long\r\n\
                   A0000 BYE closing\r\n";

    let (stream, _sent) = MockStream::new(script);

    let client = Client::from_stream(stream).await.unwrap();
    let err = client.login("user", "pass").await.unwrap_err();
    assert!(matches!(err.error, Error::Bye(_)));
}

#[test]
fn test_parser_status_responses() {
    match ResponseParser::parse(b"A0003 OK FETCH completed\r\n").unwrap() {
        Response::Tagged { tag, status, text } => {
            assert_eq!(tag, "A0003");
            assert_eq!(status, Status::Ok);
            assert_eq!(text, "FETCH completed");
        }
        other => panic!("expected tagged response, got {other:?}"),
    }

    match ResponseParser::parse(b"* NO [ALERT] mailbox is almost full\r\n").unwrap() {
        Response::Untagged(UntaggedResponse::Status { status, code, text }) => {
            assert_eq!(status, Status::No);
            assert_eq!(code.as_deref(), Some("ALERT"));
            assert_eq!(text, "mailbox is almost full");
        }
        other => panic!("expected untagged status, got {other:?}"),
    }
}
