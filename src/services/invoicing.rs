use chrono::{DateTime, Datelike, Utc};
use printpdf::{BuiltinFont, Color, Line, Mm, PdfDocument, Point, Rgb};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use std::io::BufWriter;
use tracing::instrument;
use uuid::Uuid;

use crate::{config::AppConfig, entities::order::PaymentMethod, errors::ServiceError};

/// One plus the VAT rate embedded in retail prices (IVA 19%).
const IVA_DIVISOR: Decimal = dec!(1.19);

/// Seller block printed on every invoice, sourced from configuration.
#[derive(Debug, Clone)]
pub struct SellerInfo {
    pub name: String,
    pub tax_id: String,
    pub address: String,
    pub city: String,
    pub phone: String,
    pub email: String,
    pub regime: String,
}

impl SellerInfo {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            name: cfg.company_name.clone(),
            tax_id: cfg.company_tax_id.clone(),
            address: cfg.company_address.clone(),
            city: cfg.company_city.clone(),
            phone: cfg.company_phone.clone(),
            email: cfg.admin_email.clone(),
            regime: "Responsable de IVA".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InvoiceCustomer {
    pub name: String,
    pub document_label: String,
    pub document_number: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub city: String,
}

#[derive(Debug, Clone)]
pub struct InvoiceLine {
    pub name: String,
    pub quantity: i32,
    pub unit_price: i64,
}

impl InvoiceLine {
    pub fn line_total(&self) -> i64 {
        self.unit_price * i64::from(self.quantity)
    }
}

/// Everything the PDF and CSV renderers need. Built identically by the
/// admin-transition path and the on-demand download path.
#[derive(Debug, Clone)]
pub struct InvoiceData {
    pub order_id: Uuid,
    pub date: DateTime<Utc>,
    pub payment_method: PaymentMethod,
    pub items: Vec<InvoiceLine>,
    pub shipping: i64,
    pub discount: i64,
    pub customer: InvoiceCustomer,
}

impl InvoiceData {
    pub fn subtotal(&self) -> i64 {
        self.items.iter().map(InvoiceLine::line_total).sum()
    }

    pub fn total(&self) -> i64 {
        (self.subtotal() + self.shipping - self.discount).max(0)
    }

    pub fn invoice_number(&self) -> String {
        invoice_number(self.order_id, self.date)
    }
}

/// Short human-facing order reference: last 8 hex chars, uppercased.
pub fn order_reference(order_id: Uuid) -> String {
    let simple = order_id.simple().to_string();
    simple[simple.len() - 8..].to_uppercase()
}

/// `FV-<year>-<last8 of order id>` — derived, never stored, so the webhook
/// path, the admin path and the download path always agree byte for byte.
pub fn invoice_number(order_id: Uuid, date: DateTime<Utc>) -> String {
    format!("FV-{}-{}", date.year(), order_reference(order_id))
}

/// Splits a VAT-inclusive amount into taxable base and embedded tax.
/// base = round(amount / 1.19), half-up.
pub fn tax_base(amount: i64) -> i64 {
    (Decimal::from(amount) / IVA_DIVISOR)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .unwrap_or(0)
}

pub fn embedded_tax(amount: i64) -> i64 {
    amount - tax_base(amount)
}

pub fn payment_label(method: PaymentMethod) -> &'static str {
    match method {
        PaymentMethod::Card => "Tarjeta de crédito",
        PaymentMethod::BankTransfer => "Transferencia bancaria",
    }
}

/// `$52.500 COP` — es-CO grouping with dot separators.
pub fn format_cop(value: i64) -> String {
    let negative = value < 0;
    let digits = value.unsigned_abs().to_string();

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }

    if negative {
        format!("-${} COP", grouped)
    } else {
        format!("${} COP", grouped)
    }
}

const CSV_HEADERS: [&str; 15] = [
    "N° Factura",
    "Fecha",
    "Pedido",
    "Método de Pago",
    "Cliente",
    "Documento",
    "Email",
    "Teléfono",
    "Dirección",
    "Ciudad",
    "Descripción",
    "Cantidad",
    "Precio Unitario COP",
    "IVA 19% Incluido",
    "Valor Total COP",
];

/// Renders the accounting CSV: one row per line item, then summary rows.
#[instrument(skip(data), fields(order_id = %data.order_id))]
pub fn render_csv(data: &InvoiceData) -> Result<String, ServiceError> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    writer
        .write_record(CSV_HEADERS)
        .map_err(|e| ServiceError::InvoiceError(e.to_string()))?;

    let invoice_number = data.invoice_number();
    let date_str = data.date.format("%d/%m/%Y").to_string();
    let reference = order_reference(data.order_id);
    let payment = payment_label(data.payment_method);
    let document = format!("{} {}", data.customer.document_label, data.customer.document_number);
    let city = format!("{}, Colombia", data.customer.city);

    for item in &data.items {
        let line_total = item.line_total();
        let record = vec![
            invoice_number.clone(),
            date_str.clone(),
            reference.clone(),
            payment.to_string(),
            data.customer.name.clone(),
            document.clone(),
            data.customer.email.clone(),
            data.customer.phone.clone(),
            data.customer.address.clone(),
            city.clone(),
            item.name.clone(),
            item.quantity.to_string(),
            item.unit_price.to_string(),
            embedded_tax(line_total).to_string(),
            line_total.to_string(),
        ];
        writer
            .write_record(&record)
            .map_err(|e| ServiceError::InvoiceError(e.to_string()))?;
    }

    let mut summary = |label: &str, value: Option<i64>| {
        let mut record = vec![String::new(); CSV_HEADERS.len()];
        record[10] = label.to_string();
        if let Some(value) = value {
            record[14] = value.to_string();
        }
        writer
            .write_record(&record)
            .map_err(|e| ServiceError::InvoiceError(e.to_string()))
    };

    let subtotal = data.subtotal();
    let total = data.total();

    summary("—— RESUMEN ——", None)?;
    summary("Subtotal productos", Some(subtotal))?;
    summary("Envío", Some(data.shipping))?;
    if data.discount > 0 {
        summary("Descuento", Some(-data.discount))?;
    }
    summary("Base gravable (sin IVA)", Some(tax_base(total)))?;
    summary("IVA 19% (incluido)", Some(embedded_tax(total)))?;
    summary("TOTAL A PAGAR", Some(total))?;

    let bytes = writer
        .into_inner()
        .map_err(|e| ServiceError::InvoiceError(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| ServiceError::InvoiceError(e.to_string()))
}

// PDF layout constants, all in millimeters on an A4 page.
const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 18.0;

struct PdfCursor {
    y: f32,
}

impl PdfCursor {
    fn advance(&mut self, delta: f32) -> f32 {
        self.y -= delta;
        self.y
    }
}

/// Renders the single-page A4 invoice PDF.
#[instrument(skip(data, seller), fields(order_id = %data.order_id))]
pub fn render_pdf(data: &InvoiceData, seller: &SellerInfo) -> Result<Vec<u8>, ServiceError> {
    let (doc, page, layer_index) = PdfDocument::new(
        format!("Factura {}", data.invoice_number()),
        Mm(PAGE_WIDTH),
        Mm(PAGE_HEIGHT),
        "invoice",
    );
    let layer = doc.get_page(page).get_layer(layer_index);

    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| ServiceError::InvoiceError(e.to_string()))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| ServiceError::InvoiceError(e.to_string()))?;

    let brand = Color::Rgb(Rgb::new(0.765, 0.286, 0.157, None));
    let dark = Color::Rgb(Rgb::new(0.13, 0.13, 0.13, None));
    let gray = Color::Rgb(Rgb::new(0.33, 0.33, 0.33, None));

    let divider = |at_y: f32, color: &Color, thickness: f32| {
        layer.set_outline_color(color.clone());
        layer.set_outline_thickness(thickness);
        layer.add_line(Line {
            points: vec![
                (Point::new(Mm(MARGIN), Mm(at_y)), false),
                (Point::new(Mm(PAGE_WIDTH - MARGIN), Mm(at_y)), false),
            ],
            is_closed: false,
        });
    };

    let mut cursor = PdfCursor { y: PAGE_HEIGHT - 22.0 };

    // Header: seller name left, badge right
    layer.set_fill_color(brand.clone());
    layer.use_text(seller.name.clone(), 18.0, Mm(MARGIN), Mm(cursor.y), &bold);
    layer.use_text(
        "FACTURA DE VENTA",
        12.0,
        Mm(PAGE_WIDTH - MARGIN - 52.0),
        Mm(cursor.y),
        &bold,
    );

    layer.set_fill_color(gray.clone());
    for line in [
        format!("NIT: {}", seller.tax_id),
        format!("{} — {}", seller.address, seller.city),
        format!("{} | {}", seller.phone, seller.email),
        seller.regime.clone(),
    ] {
        cursor.advance(5.0);
        layer.use_text(line, 8.0, Mm(MARGIN), Mm(cursor.y), &font);
    }

    cursor.advance(4.0);
    divider(cursor.y, &brand, 1.2);
    cursor.advance(8.0);

    // Invoice data block (left) and customer block (right)
    let col_right = PAGE_WIDTH / 2.0 + 4.0;
    let block_top = cursor.y;

    layer.set_fill_color(dark.clone());
    layer.use_text("DATOS DE LA FACTURA", 9.0, Mm(MARGIN), Mm(block_top), &bold);
    layer.use_text("DATOS DEL CLIENTE", 9.0, Mm(col_right), Mm(block_top), &bold);

    let date_str = data.date.format("%d/%m/%Y %H:%M").to_string();
    let meta_rows = [
        ("N° Factura:", data.invoice_number()),
        ("Fecha:", date_str),
        ("Pedido:", format!("#{}", order_reference(data.order_id))),
        ("Pago:", payment_label(data.payment_method).to_string()),
    ];

    let client_rows = [
        ("Cliente:", data.customer.name.clone()),
        (
            data.customer.document_label.as_str(),
            data.customer.document_number.clone(),
        ),
        ("Email:", data.customer.email.clone()),
        ("Teléfono:", data.customer.phone.clone()),
        ("Dirección:", data.customer.address.clone()),
        ("Ciudad:", format!("{}, Colombia", data.customer.city)),
    ];

    let mut row_y = block_top;
    for (label, value) in &meta_rows {
        row_y -= 5.5;
        layer.set_fill_color(gray.clone());
        layer.use_text(*label, 8.0, Mm(MARGIN), Mm(row_y), &bold);
        layer.set_fill_color(dark.clone());
        layer.use_text(value.clone(), 8.0, Mm(MARGIN + 24.0), Mm(row_y), &font);
    }

    let mut client_y = block_top;
    for (label, value) in &client_rows {
        client_y -= 5.5;
        layer.set_fill_color(gray.clone());
        layer.use_text(label.to_string(), 8.0, Mm(col_right), Mm(client_y), &bold);
        layer.set_fill_color(dark.clone());
        layer.use_text(value.clone(), 8.0, Mm(col_right + 24.0), Mm(client_y), &font);
    }

    cursor.y = row_y.min(client_y);
    cursor.advance(9.0);

    // Line-item table
    let qty_x = MARGIN + 86.0;
    let unit_x = MARGIN + 104.0;
    let iva_x = MARGIN + 134.0;
    let total_x = MARGIN + 160.0;

    layer.set_fill_color(dark.clone());
    layer.use_text("DESCRIPCIÓN", 8.5, Mm(MARGIN), Mm(cursor.y), &bold);
    layer.use_text("CANT.", 8.5, Mm(qty_x), Mm(cursor.y), &bold);
    layer.use_text("V. UNITARIO", 8.5, Mm(unit_x), Mm(cursor.y), &bold);
    layer.use_text("IVA 19% (incl.)", 8.5, Mm(iva_x), Mm(cursor.y), &bold);
    layer.use_text("V. TOTAL", 8.5, Mm(total_x), Mm(cursor.y), &bold);

    cursor.advance(2.0);
    divider(cursor.y, &gray, 0.4);

    for item in &data.items {
        cursor.advance(6.5);
        let line_total = item.line_total();

        layer.set_fill_color(dark.clone());
        layer.use_text(item.name.clone(), 8.5, Mm(MARGIN), Mm(cursor.y), &font);
        layer.use_text(item.quantity.to_string(), 8.5, Mm(qty_x), Mm(cursor.y), &font);
        layer.use_text(format_cop(item.unit_price), 8.5, Mm(unit_x), Mm(cursor.y), &font);
        layer.use_text(
            format_cop(embedded_tax(line_total)),
            8.5,
            Mm(iva_x),
            Mm(cursor.y),
            &font,
        );
        layer.use_text(format_cop(line_total), 8.5, Mm(total_x), Mm(cursor.y), &font);
    }

    cursor.advance(3.0);
    divider(cursor.y, &gray, 0.4);
    cursor.advance(8.0);

    // Totals block, right-aligned-ish
    let label_x = MARGIN + 104.0;
    let value_x = MARGIN + 150.0;
    let subtotal = data.subtotal();
    let total = data.total();

    let total_row =
        |cursor: &mut PdfCursor, label: &str, value: String, emphasized: bool| {
            layer.set_fill_color(gray.clone());
            layer.use_text(label.to_string(), 9.0, Mm(label_x), Mm(cursor.y), &font);
            layer.set_fill_color(if emphasized { brand.clone() } else { dark.clone() });
            layer.use_text(
                value,
                if emphasized { 10.0 } else { 9.0 },
                Mm(value_x),
                Mm(cursor.y),
                if emphasized { &bold } else { &font },
            );
            cursor.advance(5.5);
        };

    total_row(&mut cursor, "Subtotal productos:", format_cop(subtotal), false);
    total_row(&mut cursor, "Envío:", format_cop(data.shipping), false);
    if data.discount > 0 {
        total_row(&mut cursor, "Descuento:", format!("-{}", format_cop(data.discount)), false);
    }
    total_row(
        &mut cursor,
        "Base gravable (sin IVA):",
        format_cop(tax_base(total)),
        false,
    );
    total_row(
        &mut cursor,
        "IVA 19% (incluido):",
        format_cop(embedded_tax(total)),
        false,
    );
    total_row(&mut cursor, "TOTAL A PAGAR:", format_cop(total), true);

    cursor.advance(6.0);
    divider(cursor.y, &gray, 0.3);
    cursor.advance(6.0);

    // Footer legal lines
    layer.set_fill_color(gray.clone());
    for line in [
        "Este documento es una factura de venta equivalente. Los precios incluyen IVA del 19%.".to_string(),
        format!("Régimen: {} — {} — NIT {}", seller.regime, seller.name, seller.tax_id),
        format!("Gracias por tu compra en {}. Consultas: {}", seller.name, seller.email),
    ] {
        layer.use_text(line, 7.5, Mm(MARGIN), Mm(cursor.y), &font);
        cursor.advance(4.5);
    }

    let mut bytes = Vec::new();
    doc.save(&mut BufWriter::new(&mut bytes))
        .map_err(|e| ServiceError::InvoiceError(e.to_string()))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_invoice() -> InvoiceData {
        InvoiceData {
            order_id: Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap(),
            date: DateTime::parse_from_rfc3339("2025-03-09T15:30:00Z")
                .unwrap()
                .with_timezone(&Utc),
            payment_method: PaymentMethod::Card,
            items: vec![
                InvoiceLine {
                    name: "Palito de queso".to_string(),
                    quantity: 4,
                    unit_price: 10_000,
                },
                InvoiceLine {
                    name: "Palito de bocadillo".to_string(),
                    quantity: 2,
                    unit_price: 5_000,
                },
            ],
            shipping: 10_000,
            discount: 7_500,
            customer: InvoiceCustomer {
                name: "Ana Gómez".to_string(),
                document_label: "C.C.".to_string(),
                document_number: "1020304050".to_string(),
                email: "ana@example.com".to_string(),
                phone: "3001234567".to_string(),
                address: "Calle 10 # 4-32".to_string(),
                city: "Medellín".to_string(),
            },
        }
    }

    #[test]
    fn invoice_number_is_deterministic_across_call_sites() {
        let data = sample_invoice();
        let direct = invoice_number(data.order_id, data.date);
        assert_eq!(direct, data.invoice_number());
        assert_eq!(direct, "FV-2025-55440000");
    }

    #[test]
    fn invoice_number_uses_payment_year() {
        let id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        let date = DateTime::parse_from_rfc3339("2024-12-31T23:59:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(invoice_number(id, date), "FV-2024-55440000");
    }

    #[test]
    fn tax_split_rounds_half_up() {
        // 52,500 / 1.19 = 44,117.647 -> 44,118
        assert_eq!(tax_base(52_500), 44_118);
        assert_eq!(embedded_tax(52_500), 8_382);
        assert_eq!(tax_base(0), 0);
        // base + tax always reassembles the amount
        for amount in [1, 99, 11_900, 52_500, 1_000_000] {
            assert_eq!(tax_base(amount) + embedded_tax(amount), amount);
        }
    }

    #[test]
    fn cop_formatting_groups_thousands() {
        assert_eq!(format_cop(0), "$0 COP");
        assert_eq!(format_cop(999), "$999 COP");
        assert_eq!(format_cop(52_500), "$52.500 COP");
        assert_eq!(format_cop(1_234_567), "$1.234.567 COP");
        assert_eq!(format_cop(-7_500), "-$7.500 COP");
    }

    #[test]
    fn totals_follow_the_discount_scenario() {
        // subtotal 50,000 + shipping 10,000 - 15% coupon (7,500) = 52,500
        let data = sample_invoice();
        assert_eq!(data.subtotal(), 50_000);
        assert_eq!(data.total(), 52_500);
    }

    #[test]
    fn csv_has_item_and_summary_rows() {
        let data = sample_invoice();
        let csv = render_csv(&data).unwrap();

        let mut lines = csv.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("N° Factura,Fecha,Pedido"));

        let body: Vec<&str> = lines.collect();
        // 2 item rows + 7 summary rows (discount present)
        assert_eq!(body.len(), 9);
        assert!(body[0].contains("Palito de queso"));
        assert!(body.iter().any(|l| l.contains("TOTAL A PAGAR") && l.contains("52500")));
        assert!(body.iter().any(|l| l.contains("Descuento") && l.contains("-7500")));
    }

    #[test]
    fn csv_skips_discount_row_when_zero() {
        let mut data = sample_invoice();
        data.discount = 0;
        let csv = render_csv(&data).unwrap();
        assert!(!csv.contains("Descuento"));
    }

    #[test]
    fn pdf_renders_bytes() {
        let data = sample_invoice();
        let seller = SellerInfo {
            name: "Don Palito Junior".to_string(),
            tax_id: "71710169-0".to_string(),
            address: "Carrera 47 # 76D Sur-37".to_string(),
            city: "Sabaneta, Antioquia".to_string(),
            phone: "3148702078".to_string(),
            email: "donpalitojr@gmail.com".to_string(),
            regime: "Responsable de IVA".to_string(),
        };

        let bytes = render_pdf(&data, &seller).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        assert!(bytes.len() > 500);
    }
}
