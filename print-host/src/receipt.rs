//! Sales receipt renderer
//!
//! Renders a completed sale into formatting intents for 58mm/80mm thermal
//! printers. The intents can be submitted as a structured ESC/POS job.

use chrono::NaiveDateTime;
use pos_printer::{ALIGN_CENTER, BOLD_OFF, BOLD_ON, EscPosBuilder, Intent, TextEncoding};
use serde::{Deserialize, Serialize};

/// One sold line
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleItem {
    pub name: String,
    pub quantity: u32,
    /// Unit price
    pub price: f64,
}

/// A completed sale
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sale {
    pub id: String,
    pub created_at: NaiveDateTime,
    pub cashier: String,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub table: Option<String>,
    pub items: Vec<SaleItem>,
    /// Grand total including tax
    pub total: f64,
}

impl Sale {
    pub fn subtotal(&self) -> f64 {
        self.items
            .iter()
            .map(|i| i.price * f64::from(i.quantity))
            .sum()
    }

    pub fn item_count(&self) -> u32 {
        self.items.iter().map(|i| i.quantity).sum()
    }
}

/// Shop-level receipt settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReceiptSettings {
    pub app_name: String,
    pub currency_symbol: String,
}

impl Default for ReceiptSettings {
    fn default() -> Self {
        Self {
            app_name: "POS SYSTEM".to_string(),
            currency_symbol: "Rp".to_string(),
        }
    }
}

/// Receipt renderer
pub struct ReceiptRenderer {
    width: usize,
    settings: ReceiptSettings,
    text_encoding: TextEncoding,
}

impl ReceiptRenderer {
    /// Create a renderer for the given paper width in characters
    ///
    /// Common widths:
    /// - 58mm paper: 32 characters
    /// - 80mm paper: 48 characters
    pub fn new(width: usize, settings: ReceiptSettings) -> Self {
        Self {
            width,
            settings,
            text_encoding: TextEncoding::Utf8,
        }
    }

    /// Measure columns the way the printer will render the encoded text
    pub fn with_text_encoding(mut self, text_encoding: TextEncoding) -> Self {
        self.text_encoding = text_encoding;
        self
    }

    fn two_column(&self, left: &str, right: &str, width: usize) -> String {
        self.text_encoding.format_two_column(left, right, width)
    }

    /// Render a sale, ending with feed and cut
    pub fn render(&self, sale: &Sale) -> Vec<Intent> {
        let mut b = EscPosBuilder::new();

        self.render_header(&mut b, sale);
        for item in &sale.items {
            self.render_item(&mut b, item);
        }
        b.separator();
        self.render_totals(&mut b, sale);
        self.render_footer(&mut b, sale);

        b.into_intents()
    }

    fn render_header(&self, b: &mut EscPosBuilder, sale: &Sale) {
        b.raw(&ALIGN_CENTER);
        b.raw(&BOLD_ON);
        b.large_line(&self.settings.app_name);
        b.raw(&BOLD_OFF);
        b.center("SALES RECEIPT");
        b.separator();

        b.line(&format!("Receipt #: {}", sale.id));
        b.line(&format!("Date: {}", sale.created_at.format("%-d/%-m/%Y")));
        b.line(&format!("Time: {}", sale.created_at.format("%H.%M")));
        b.line(&format!("Cashier: {}", sale.cashier));
        if let Some(payment) = &sale.payment_method {
            b.line(&format!("Payment: {}", payment));
        }
        if let Some(table) = &sale.table {
            b.line(&format!("Table: {}", table));
        }
        b.separator();
    }

    fn render_item(&self, b: &mut EscPosBuilder, item: &SaleItem) {
        let cur = &self.settings.currency_symbol;
        let line_total = item.price * f64::from(item.quantity);

        b.bold_line(&item.name);
        b.line(&self.two_column(
            &format!("  {} x {}{}", item.quantity, cur, format_number(item.price)),
            &format!("{}{}", cur, format_number(line_total)),
            self.width,
        ));
    }

    fn render_totals(&self, b: &mut EscPosBuilder, sale: &Sale) {
        let cur = &self.settings.currency_symbol;
        let subtotal = sale.subtotal();
        let tax = sale.total - subtotal;

        b.line(&self.two_column(
            "Subtotal:",
            &format!("{}{}", cur, format_number(subtotal)),
            self.width,
        ));
        if tax > 0.0 {
            b.line(&self.two_column(
                "Tax:",
                &format!("{}{}", cur, format_number(tax)),
                self.width,
            ));
        }

        // Double-width font: half as many characters per line
        b.raw(&BOLD_ON);
        b.large_line(&self.two_column(
            "TOTAL:",
            &format!("{}{}", cur, format_number(sale.total)),
            self.width / 2,
        ));
        b.raw(&BOLD_OFF);
        b.separator();
    }

    fn render_footer(&self, b: &mut EscPosBuilder, sale: &Sale) {
        b.center(&format!("Items: {}", sale.item_count()));
        b.feed(1);
        b.center("Thank you for your purchase!");
        b.center("Please come again!");
        b.feed(3);
        b.cut();
    }
}

/// Format an amount Indonesian style: `.` groups thousands, `,` marks
/// decimals, at most three fraction digits
pub fn format_number(value: f64) -> String {
    let scaled = (value.abs() * 1000.0).round() as u64;
    let int_part = scaled / 1000;
    let frac_part = scaled % 1000;

    let digits = int_part.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 5);
    if value < 0.0 && scaled > 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push('.');
        }
        out.push(ch);
    }

    if frac_part > 0 {
        let frac = format!("{:03}", frac_part);
        out.push(',');
        out.push_str(frac.trim_end_matches('0'));
    }
    out
}
