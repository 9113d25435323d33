//! Receipt printers. Printing is best effort: callers log a failed print and move on,
//! an order is never rolled back or rejected because of it.

use std::{path::PathBuf, sync::Arc, time::Duration};

use async_trait::async_trait;
use encoding_rs::WINDOWS_1252;
use serde::Serialize;
use thiserror::Error;
use tokio::{fs::OpenOptions, io::AsyncWriteExt, net::TcpStream};
use utoipa::ToSchema;

use crate::{
    config::{PrinterConfig, PrinterKind},
    receipt::{Receipt, ReceiptLine, render_line},
};

#[derive(Debug, Error)]
pub enum PrintError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

pub type PrintResult<T> = Result<T, PrintError>;

/// Anything that can put a receipt on paper (or pretend to).
#[async_trait]
pub trait ReceiptPrinter: Send + Sync {
    fn name(&self) -> &'static str;

    /// `false` when no physical printer is attached.
    fn is_configured(&self) -> bool {
        true
    }

    async fn print(&self, receipt: &Receipt) -> PrintResult<()>;
}

/// Used when no printer is configured: logs the receipt and reports success.
#[derive(Debug, Clone)]
pub struct NoopPrinter {
    width: usize,
}

impl NoopPrinter {
    pub fn new(width: usize) -> Self {
        Self { width }
    }
}

#[async_trait]
impl ReceiptPrinter for NoopPrinter {
    fn name(&self) -> &'static str {
        "noop"
    }

    fn is_configured(&self) -> bool {
        false
    }

    async fn print(&self, receipt: &Receipt) -> PrintResult<()> {
        tracing::debug!(
            order_number = %receipt.order_number,
            receipt = %receipt.render_text(self.width).join("\n"),
            "printer not configured, receipt not printed"
        );
        Ok(())
    }
}

/// Raw ESC/POS over TCP, port 9100 on most thermal printers.
#[derive(Debug, Clone)]
pub struct NetworkPrinter {
    addr: String,
    width: usize,
    timeout: Duration,
}

impl NetworkPrinter {
    /// `addr` is `host:port`; the host is resolved on every print.
    pub fn new(addr: &str, width: usize) -> PrintResult<Self> {
        let addr = addr.trim();
        let valid = addr
            .rsplit_once(':')
            .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
        if !valid {
            return Err(PrintError::InvalidConfig(format!(
                "Invalid address: {addr:?}, expected host:port"
            )));
        }
        Ok(Self {
            addr: addr.to_string(),
            width,
            timeout: Duration::from_secs(5),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ReceiptPrinter for NetworkPrinter {
    fn name(&self) -> &'static str {
        "network"
    }

    #[tracing::instrument(skip_all, fields(addr = %self.addr, order_number = %receipt.order_number))]
    async fn print(&self, receipt: &Receipt) -> PrintResult<()> {
        let data = escpos_bytes(receipt, self.width);

        let mut stream = tokio::time::timeout(self.timeout, TcpStream::connect(self.addr.as_str()))
            .await
            .map_err(|_| PrintError::Timeout(format!("Connection timeout: {}", self.addr)))?
            .map_err(|e| PrintError::Connection(format!("{}: {}", self.addr, e)))?;

        tokio::time::timeout(self.timeout, async {
            stream.write_all(&data).await?;
            stream.flush().await
        })
        .await
        .map_err(|_| PrintError::Timeout(format!("Write timeout: {}", self.addr)))??;

        tracing::debug!(bytes = data.len(), "print job sent");
        Ok(())
    }
}

/// Writes to a printer device node such as `/dev/usb/lp0`.
#[derive(Debug, Clone)]
pub struct DevicePrinter {
    path: PathBuf,
    width: usize,
}

impl DevicePrinter {
    pub fn new(path: impl Into<PathBuf>, width: usize) -> Self {
        Self {
            path: path.into(),
            width,
        }
    }
}

#[async_trait]
impl ReceiptPrinter for DevicePrinter {
    fn name(&self) -> &'static str {
        "device"
    }

    async fn print(&self, receipt: &Receipt) -> PrintResult<()> {
        let mut device = OpenOptions::new().append(true).open(&self.path).await?;
        device.write_all(&escpos_bytes(receipt, self.width)).await?;
        device.flush().await?;
        Ok(())
    }
}

pub fn printer_from_config(config: &PrinterConfig) -> PrintResult<Arc<dyn ReceiptPrinter>> {
    let printer: Arc<dyn ReceiptPrinter> = match &config.kind {
        PrinterKind::Disabled => Arc::new(NoopPrinter::new(config.width)),
        PrinterKind::Network(addr) => Arc::new(NetworkPrinter::new(addr, config.width)?),
        PrinterKind::Device(path) => Arc::new(DevicePrinter::new(path.clone(), config.width)),
    };
    Ok(printer)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum PrintOutcome {
    Printed,
    /// No printer configured.
    Skipped,
    Failed,
}

/// Never fails; the outcome is logged and returned.
pub async fn emit_receipt(printer: Arc<dyn ReceiptPrinter>, receipt: Receipt) -> PrintOutcome {
    let configured = printer.is_configured();
    let name = printer.name();

    match printer.print(&receipt).await {
        Ok(()) if configured => {
            tracing::info!(order_number = %receipt.order_number, printer = name, "receipt printed");
            PrintOutcome::Printed
        }
        Ok(()) => PrintOutcome::Skipped,
        Err(err) => {
            tracing::warn!(
                order_number = %receipt.order_number,
                printer = name,
                error = %err,
                "receipt print failed"
            );
            PrintOutcome::Failed
        }
    }
}

const ESC: u8 = 0x1B;
const GS: u8 = 0x1D;
/// `ESC t` table for WPC1252, which covers Indonesian and other Latin text.
const CODE_PAGE_WPC1252: u8 = 16;

/// ESC/POS byte stream: init, code page, aligned text, bold emphasis, feed and partial cut.
pub fn escpos_bytes(receipt: &Receipt, width: usize) -> Vec<u8> {
    let mut buf = Vec::with_capacity(1024);
    buf.extend_from_slice(&[ESC, b'@', ESC, b't', CODE_PAGE_WPC1252]);

    for (idx, section) in receipt.sections.iter().enumerate() {
        if idx > 0 {
            push_text(&mut buf, &"=".repeat(width));
        }
        for line in &section.lines {
            match line {
                ReceiptLine::Title { text } => {
                    buf.extend_from_slice(&[ESC, b'a', 1, ESC, b'E', 1]);
                    push_text(&mut buf, text);
                    buf.extend_from_slice(&[ESC, b'E', 0, ESC, b'a', 0]);
                }
                ReceiptLine::Centered { text } => {
                    buf.extend_from_slice(&[ESC, b'a', 1]);
                    push_text(&mut buf, text);
                    buf.extend_from_slice(&[ESC, b'a', 0]);
                }
                ReceiptLine::Amount { emphasis: true, .. } => {
                    buf.extend_from_slice(&[ESC, b'E', 1]);
                    push_rendered(&mut buf, line, width);
                    buf.extend_from_slice(&[ESC, b'E', 0]);
                }
                other => push_rendered(&mut buf, other, width),
            }
        }
    }

    // feed 4 lines, then partial cut
    buf.extend_from_slice(&[ESC, b'd', 4, GS, b'V', 66, 0]);
    buf
}

/// Encode for the WPC1252 code page, one byte per character so the fixed-width layout
/// holds. Characters the code page lacks print as `?`.
pub fn encode_text(text: &str) -> Vec<u8> {
    let (bytes, _, had_errors) = WINDOWS_1252.encode(text);
    if !had_errors {
        return bytes.into_owned();
    }

    let mut out = Vec::with_capacity(text.len());
    let mut utf8 = [0u8; 4];
    for c in text.chars() {
        let (bytes, _, unmappable) = WINDOWS_1252.encode(c.encode_utf8(&mut utf8));
        if unmappable {
            out.push(b'?');
        } else {
            out.extend_from_slice(&bytes);
        }
    }
    out
}

fn push_text(buf: &mut Vec<u8>, text: &str) {
    buf.extend_from_slice(&encode_text(text));
    buf.push(b'\n');
}

fn push_rendered(buf: &mut Vec<u8>, line: &ReceiptLine, width: usize) {
    let mut rendered = Vec::new();
    render_line(line, width, &mut rendered);
    for text in rendered {
        push_text(buf, &text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receipt::{ReceiptSection, SectionKind};
    use std::sync::Mutex;
    use tokio::{io::AsyncReadExt, net::TcpListener};

    fn receipt() -> Receipt {
        Receipt {
            order_number: "TMA-20250614-001".into(),
            sections: vec![
                ReceiptSection {
                    kind: SectionKind::Header,
                    lines: vec![ReceiptLine::Title {
                        text: "JUS BUAH TAMA".into(),
                    }],
                },
                ReceiptSection {
                    kind: SectionKind::Items,
                    lines: vec![ReceiptLine::Item {
                        name: "Jus Café Susu".into(),
                        quantity: 1,
                        amount: 24000,
                    }],
                },
                ReceiptSection {
                    kind: SectionKind::Totals,
                    lines: vec![ReceiptLine::Amount {
                        label: "TOTAL".into(),
                        amount: 24000,
                        emphasis: true,
                    }],
                },
            ],
        }
    }

    struct FailingPrinter;

    #[async_trait]
    impl ReceiptPrinter for FailingPrinter {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn print(&self, _receipt: &Receipt) -> PrintResult<()> {
            Err(PrintError::Connection("offline".into()))
        }
    }

    #[derive(Default)]
    struct RecordingPrinter {
        printed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ReceiptPrinter for RecordingPrinter {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn print(&self, receipt: &Receipt) -> PrintResult<()> {
            self.printed
                .lock()
                .expect("lock")
                .push(receipt.order_number.clone());
            Ok(())
        }
    }

    fn decode(bytes: &[u8]) -> String {
        WINDOWS_1252.decode(bytes).0.into_owned()
    }

    #[test]
    fn escpos_stream_is_framed_by_init_and_cut() {
        let bytes = escpos_bytes(&receipt(), 32);
        assert_eq!(&bytes[..5], &[ESC, b'@', ESC, b't', CODE_PAGE_WPC1252]);
        assert_eq!(&bytes[bytes.len() - 4..], &[GS, b'V', 66, 0]);
        let text = decode(&bytes);
        assert!(text.contains("JUS BUAH TAMA"));
        assert!(text.contains("Rp 24.000"));
    }

    #[test]
    fn accented_names_survive_on_paper() {
        let bytes = escpos_bytes(&receipt(), 32);
        assert!(decode(&bytes).contains("Jus Café Susu"));
        // é is the single byte 0xE9 in WPC1252
        assert!(bytes.windows(4).any(|w| w == b"Caf\xE9"));
    }

    #[test]
    fn characters_outside_the_code_page_become_question_marks() {
        assert_eq!(encode_text("Jus 🍹 Mangga"), b"Jus ? Mangga");
        assert_eq!(encode_text("Rp 24.000"), b"Rp 24.000");
    }

    #[test]
    fn network_address_needs_a_port() {
        assert!(matches!(
            NetworkPrinter::new("192.168.1.50", 32),
            Err(PrintError::InvalidConfig(_))
        ));
        assert!(NetworkPrinter::new("printer.local:9100", 32).is_ok());
    }

    #[tokio::test]
    async fn network_printer_streams_escpos_bytes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            socket.read_to_end(&mut received).await.unwrap();
            received
        });

        let printer = NetworkPrinter::new(&addr.to_string(), 32).unwrap();
        printer.print(&receipt()).await.unwrap();

        let received = server.await.unwrap();
        assert_eq!(received, escpos_bytes(&receipt(), 32));
    }

    #[tokio::test]
    async fn unreachable_network_printer_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let printer = NetworkPrinter::new(&addr.to_string(), 32)
            .unwrap()
            .with_timeout(Duration::from_millis(500));
        let outcome = emit_receipt(Arc::new(printer), receipt()).await;
        assert_eq!(outcome, PrintOutcome::Failed);
    }

    #[tokio::test]
    async fn failures_are_reported_not_raised() {
        let outcome = emit_receipt(Arc::new(FailingPrinter), receipt()).await;
        assert_eq!(outcome, PrintOutcome::Failed);
    }

    #[tokio::test]
    async fn unconfigured_printer_is_skipped() {
        let outcome = emit_receipt(Arc::new(NoopPrinter::new(32)), receipt()).await;
        assert_eq!(outcome, PrintOutcome::Skipped);
    }

    #[tokio::test]
    async fn configured_printer_receives_receipt() {
        let printer = Arc::new(RecordingPrinter::default());
        let outcome = emit_receipt(printer.clone(), receipt()).await;
        assert_eq!(outcome, PrintOutcome::Printed);
        assert_eq!(
            printer.printed.lock().unwrap().as_slice(),
            ["TMA-20250614-001".to_string()]
        );
    }

    #[tokio::test]
    async fn device_printer_reports_missing_device() {
        let printer = DevicePrinter::new("/nonexistent/lp9", 32);
        assert!(matches!(
            printer.print(&receipt()).await,
            Err(PrintError::Io(_))
        ));
    }
}
