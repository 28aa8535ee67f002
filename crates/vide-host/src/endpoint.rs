//! Dev endpoint reachability.
//!
//! Connecting can block for the full timeout per resolved address, so the
//! check runs on its own thread and reports back through a callback.

use std::io;
use std::net::TcpStream;
use std::time::Duration;
use url::Url;

/// How long a dev endpoint gets to accept a connection
pub const ENDPOINT_CHECK_TIMEOUT: Duration = Duration::from_millis(500);

/// Check that the dev server accepts connections.
pub fn check_endpoint(url: &Url, timeout: Duration) -> Result<(), String> {
    let addrs = url
        .socket_addrs(|| None)
        .map_err(|err| format!("Cannot resolve {}: {}", url, err))?;
    if addrs
        .iter()
        .any(|addr| TcpStream::connect_timeout(addr, timeout).is_ok())
    {
        Ok(())
    } else {
        Err(format!("Development endpoint {} is not reachable", url))
    }
}

/// Run [`check_endpoint`] on a background thread and hand the result to
/// `report`.
pub fn spawn_endpoint_check<F>(url: Url, timeout: Duration, report: F) -> io::Result<()>
where
    F: FnOnce(Result<(), String>) + Send + 'static,
{
    std::thread::Builder::new()
        .name("endpoint-check".into())
        .spawn(move || report(check_endpoint(&url, timeout)))
        .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::sync::mpsc;

    fn local_url(port: u16) -> Url {
        Url::parse(&format!("http://127.0.0.1:{}/", port)).unwrap()
    }

    #[test]
    fn test_listening_endpoint_is_reachable() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = local_url(listener.local_addr().unwrap().port());

        let (tx, rx) = mpsc::channel();
        spawn_endpoint_check(url, ENDPOINT_CHECK_TIMEOUT, move |result| {
            let _ = tx.send(result);
        })
        .unwrap();

        let result = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn test_closed_port_reports_unreachable() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let (tx, rx) = mpsc::channel();
        spawn_endpoint_check(local_url(port), ENDPOINT_CHECK_TIMEOUT, move |result| {
            let _ = tx.send(result);
        })
        .unwrap();

        let err = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap_err();
        assert!(err.contains("is not reachable"), "{err}");
    }

    #[test]
    fn test_check_returns_without_blocking_caller() {
        // 192.0.2.0/24 is reserved for documentation; connects there hang
        let url = Url::parse("http://192.0.2.1:9/").unwrap();
        let (tx, rx) = mpsc::channel();
        let started = std::time::Instant::now();
        spawn_endpoint_check(url, Duration::from_millis(200), move |result| {
            let _ = tx.send(result);
        })
        .unwrap();
        assert!(started.elapsed() < Duration::from_millis(100));

        assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap().is_err());
    }
}
