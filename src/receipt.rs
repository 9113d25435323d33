//! Receipt layout for a persisted order. Pure formatting; sending it anywhere is the
//! printer's job.

use chrono::Local;
use serde::Serialize;
use utoipa::ToSchema;

use crate::models::OrderDetail;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShopInfo {
    pub name: String,
    pub tagline: Option<String>,
    pub contact: Option<String>,
    pub footer: Vec<String>,
}

impl Default for ShopInfo {
    fn default() -> Self {
        Self {
            name: "JUS BUAH TAMA".to_string(),
            tagline: Some("Fresh juice everyday".to_string()),
            contact: None,
            footer: vec!["Terima kasih!".to_string(), "Sehat selalu!".to_string()],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum SectionKind {
    Header,
    OrderInfo,
    Items,
    Totals,
    Payment,
    Footer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ReceiptLine {
    Title { text: String },
    Centered { text: String },
    Text { text: String },
    Item { name: String, quantity: i32, amount: i64 },
    Note { text: String },
    Amount { label: String, amount: i64, emphasis: bool },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ReceiptSection {
    pub kind: SectionKind,
    pub lines: Vec<ReceiptLine>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub order_number: String,
    pub sections: Vec<ReceiptSection>,
}

impl Receipt {
    pub fn section(&self, kind: SectionKind) -> Option<&ReceiptSection> {
        self.sections.iter().find(|s| s.kind == kind)
    }

    /// Fixed-width text rendering; sections are separated by a rule.
    pub fn render_text(&self, width: usize) -> Vec<String> {
        let mut out = Vec::new();
        for (idx, section) in self.sections.iter().enumerate() {
            if idx > 0 {
                out.push("=".repeat(width));
            }
            for line in &section.lines {
                render_line(line, width, &mut out);
            }
        }
        out
    }
}

pub fn format_receipt(order: &OrderDetail, shop: &ShopInfo) -> Receipt {
    let mut header = vec![ReceiptLine::Title {
        text: shop.name.clone(),
    }];
    header.extend(
        [shop.tagline.as_ref(), shop.contact.as_ref()]
            .into_iter()
            .flatten()
            .map(|text| ReceiptLine::Centered { text: text.clone() }),
    );

    let cashier = order
        .user
        .as_ref()
        .map(|u| u.name.as_str())
        .unwrap_or("-");
    let order_info = vec![
        ReceiptLine::Text {
            text: format!("No: {}", order.order.order_number),
        },
        ReceiptLine::Text {
            text: format!("Cashier: {cashier}"),
        },
        ReceiptLine::Text {
            text: format!(
                "Date: {}",
                order
                    .order
                    .created_at
                    .with_timezone(&Local)
                    .format("%d/%m/%Y %H:%M")
            ),
        },
    ];

    let mut items = Vec::new();
    for item in &order.order_items {
        let name = item
            .product
            .as_ref()
            .map(|p| p.name.clone())
            .unwrap_or_else(|| item.product_id.to_string());
        items.push(ReceiptLine::Item {
            name,
            quantity: item.quantity,
            amount: item.line_total(),
        });
        if let Some(note) = item.notes.as_ref().filter(|n| !n.trim().is_empty()) {
            items.push(ReceiptLine::Note { text: note.clone() });
        }
    }

    let totals = vec![
        ReceiptLine::Amount {
            label: "Subtotal".to_string(),
            amount: order.order.subtotal,
            emphasis: false,
        },
        ReceiptLine::Amount {
            label: "TOTAL".to_string(),
            amount: order.order.total,
            emphasis: true,
        },
    ];

    let mut payment = vec![ReceiptLine::Amount {
        label: order.order.payment_method.to_string(),
        amount: order.order.amount_paid,
        emphasis: false,
    }];
    if order.order.change > 0 {
        payment.push(ReceiptLine::Amount {
            label: "Change".to_string(),
            amount: order.order.change,
            emphasis: false,
        });
    }

    let footer = shop
        .footer
        .iter()
        .map(|text| ReceiptLine::Centered { text: text.clone() })
        .collect();

    Receipt {
        order_number: order.order.order_number.clone(),
        sections: vec![
            ReceiptSection {
                kind: SectionKind::Header,
                lines: header,
            },
            ReceiptSection {
                kind: SectionKind::OrderInfo,
                lines: order_info,
            },
            ReceiptSection {
                kind: SectionKind::Items,
                lines: items,
            },
            ReceiptSection {
                kind: SectionKind::Totals,
                lines: totals,
            },
            ReceiptSection {
                kind: SectionKind::Payment,
                lines: payment,
            },
            ReceiptSection {
                kind: SectionKind::Footer,
                lines: footer,
            },
        ],
    }
}

/// `24000` -> `Rp 24.000`
pub fn format_rupiah(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }
    if amount < 0 {
        format!("-Rp {grouped}")
    } else {
        format!("Rp {grouped}")
    }
}

pub(crate) fn render_line(line: &ReceiptLine, width: usize, out: &mut Vec<String>) {
    match line {
        ReceiptLine::Title { text } | ReceiptLine::Centered { text } => {
            out.push(center(text, width))
        }
        ReceiptLine::Text { text } => out.push(truncate(text, width)),
        ReceiptLine::Note { text } => out.push(truncate(&format!("  Note: {text}"), width)),
        ReceiptLine::Amount { label, amount, .. } => {
            out.push(spread(label, &format_rupiah(*amount), width))
        }
        ReceiptLine::Item {
            name,
            quantity,
            amount,
        } => {
            let right = format!("x{} {}", quantity, format_rupiah(*amount));
            let name_width = width.saturating_sub(right.chars().count() + 1);
            if name.chars().count() <= name_width {
                out.push(spread(name, &right, width));
            } else {
                out.push(truncate(name, width));
                out.push(spread("", &right, width));
            }
        }
    }
}

fn truncate(text: &str, width: usize) -> String {
    text.chars().take(width).collect()
}

fn center(text: &str, width: usize) -> String {
    let text = truncate(text, width);
    let pad = (width - text.chars().count()) / 2;
    format!("{}{}", " ".repeat(pad), text)
}

fn spread(left: &str, right: &str, width: usize) -> String {
    let used = left.chars().count() + right.chars().count();
    if used >= width {
        return truncate(&format!("{left} {right}"), width);
    }
    format!("{}{}{}", left, " ".repeat(width - used), right)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Cashier, Order, OrderItem, OrderStatus, PaymentMethod, ProductSummary};
    use chrono::Utc;
    use uuid::Uuid;

    fn sample_order(amount_paid: i64) -> OrderDetail {
        let order_id = Uuid::new_v4();
        let product_id = Uuid::new_v4();
        let now = Utc::now();
        OrderDetail {
            order: Order {
                id: order_id,
                order_number: "TMA-20250614-007".into(),
                subtotal: 24000,
                total: 24000,
                payment_method: PaymentMethod::Cash,
                amount_paid,
                change: amount_paid - 24000,
                status: OrderStatus::Completed,
                notes: None,
                user_id: Uuid::new_v4(),
                created_at: now,
                updated_at: now,
            },
            user: Some(Cashier {
                id: Uuid::new_v4(),
                username: "kasir".into(),
                name: "Kasir Tama".into(),
            }),
            order_items: vec![OrderItem {
                id: Uuid::new_v4(),
                order_id,
                line_no: 1,
                product_id,
                quantity: 2,
                price: 12000,
                notes: Some("less ice".into()),
                created_at: now,
                product: Some(ProductSummary {
                    id: product_id,
                    name: "Jus Jeruk".into(),
                    price: 13000,
                }),
            }],
        }
    }

    #[test]
    fn rupiah_groups_thousands() {
        assert_eq!(format_rupiah(0), "Rp 0");
        assert_eq!(format_rupiah(500), "Rp 500");
        assert_eq!(format_rupiah(24000), "Rp 24.000");
        assert_eq!(format_rupiah(1250000), "Rp 1.250.000");
        assert_eq!(format_rupiah(-6000), "-Rp 6.000");
    }

    #[test]
    fn receipt_lists_items_with_snapshot_price_and_change() {
        let receipt = format_receipt(&sample_order(30000), &ShopInfo::default());

        let items = receipt.section(SectionKind::Items).unwrap();
        assert_eq!(
            items.lines[0],
            ReceiptLine::Item {
                name: "Jus Jeruk".into(),
                quantity: 2,
                amount: 24000,
            }
        );
        assert_eq!(
            items.lines[1],
            ReceiptLine::Note {
                text: "less ice".into()
            }
        );

        let payment = receipt.section(SectionKind::Payment).unwrap();
        assert_eq!(payment.lines.len(), 2);
        assert!(matches!(
            &payment.lines[1],
            ReceiptLine::Amount { label, amount: 6000, .. } if label == "Change"
        ));
    }

    #[test]
    fn exact_payment_has_no_change_line() {
        let receipt = format_receipt(&sample_order(24000), &ShopInfo::default());
        let payment = receipt.section(SectionKind::Payment).unwrap();
        assert_eq!(payment.lines.len(), 1);
    }

    #[test]
    fn text_rendering_respects_width() {
        let receipt = format_receipt(&sample_order(30000), &ShopInfo::default());
        let lines = receipt.render_text(32);
        assert!(lines.iter().all(|l| l.chars().count() <= 32));
        assert!(lines.iter().any(|l| l.contains("TMA-20250614-007")));
        assert!(lines.iter().any(|l| l.starts_with("TOTAL") && l.ends_with("Rp 24.000")));
        assert!(lines.iter().any(|l| l.contains("Cashier: Kasir Tama")));
    }
}
