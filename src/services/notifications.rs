//! Outbound email: order-created, order-updated and invoice messages.
//!
//! Sending is always invoked from the background event worker, never from a
//! request path. Admin copies are unconditional; customer copies honor the
//! customer's `email_notifications` flag.

use futures::future;
use lettre::{
    message::{header::ContentType, Attachment, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::{config::AppConfig, entities::order::OrderStatus, errors::ServiceError};

#[derive(Debug, Clone)]
pub struct EmailLineItem {
    pub name: String,
    pub quantity: i32,
    pub price: i64,
}

/// Context shared by the order-created and order-updated emails.
#[derive(Debug, Clone)]
pub struct OrderEmailData {
    pub order_id: Uuid,
    pub status: Option<OrderStatus>,
    pub user_email: String,
    pub user_name: String,
    pub items: Vec<EmailLineItem>,
    pub subtotal: i64,
    pub shipping_fee: i64,
    pub discount: i64,
    pub total: i64,
    pub shipping_full_name: String,
    pub shipping_street_address: String,
    pub shipping_city: String,
    pub shipping_phone_number: Option<String>,
    pub email_notifications: bool,
}

/// Context for the invoice email pair (customer PDF, admin PDF+CSV).
#[derive(Debug, Clone)]
pub struct InvoiceEmailData {
    pub order_id: Uuid,
    pub user_email: String,
    pub user_name: String,
    pub invoice_number: String,
    pub pdf: Vec<u8>,
    pub csv: String,
    pub email_notifications: bool,
}

#[derive(Clone)]
pub struct EmailService {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
    admin_email: String,
    app_name: String,
    logo_url: Option<String>,
}

impl EmailService {
    /// Builds the SMTP transport from configuration. Returns `None` when
    /// SMTP is not configured, in which case the worker logs and skips.
    pub fn from_config(cfg: &AppConfig) -> Result<Option<Self>, ServiceError> {
        if !cfg.smtp_configured() {
            return Ok(None);
        }

        let host = cfg.smtp_host.clone().unwrap_or_default();
        let credentials = Credentials::new(
            cfg.smtp_username.clone().unwrap_or_default(),
            cfg.smtp_password.clone().unwrap_or_default(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&host)
            .map_err(|e| ServiceError::EmailError(e.to_string()))?
            .port(cfg.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Some(Self {
            mailer,
            from_address: format!("\"{}\" <{}>", cfg.app_name, cfg.admin_email),
            admin_email: cfg.admin_email.clone(),
            app_name: cfg.app_name.clone(),
            logo_url: cfg.logo_url.clone(),
        }))
    }

    async fn send_html(
        &self,
        to: &str,
        subject: &str,
        html: String,
        attachments: Vec<(String, &'static str, Vec<u8>)>,
    ) -> Result<(), ServiceError> {
        let html_part = SinglePart::builder()
            .header(ContentType::TEXT_HTML)
            .body(html);

        let body = if attachments.is_empty() {
            MultiPart::mixed().singlepart(html_part)
        } else {
            let mut multipart = MultiPart::mixed().singlepart(html_part);
            for (filename, content_type, bytes) in attachments {
                let content_type = ContentType::parse(content_type)
                    .map_err(|e| ServiceError::EmailError(e.to_string()))?;
                multipart = multipart.singlepart(Attachment::new(filename).body(bytes, content_type));
            }
            multipart
        };

        let message = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| ServiceError::EmailError("invalid from address".to_string()))?,
            )
            .to(to
                .parse()
                .map_err(|_| ServiceError::EmailError(format!("invalid recipient: {}", to)))?)
            .subject(subject)
            .multipart(body)
            .map_err(|e| ServiceError::EmailError(e.to_string()))?;

        self.mailer
            .send(message)
            .await
            .map_err(|e| ServiceError::EmailError(e.to_string()))?;

        info!(to = %to, subject = %subject, "email sent");
        Ok(())
    }

    /// New-order notification: admin copy always, customer copy if opted in.
    #[instrument(skip(self, data), fields(order_id = %data.order_id))]
    pub async fn send_order_created(&self, data: &OrderEmailData) -> Result<(), ServiceError> {
        let reference = order_ref(data.order_id);
        let detail = full_order_detail(data);

        let admin_html = wrap_with_order_ref(
            &self.app_name,
            self.logo_url.as_deref(),
            &reference,
            &format!(
                "{}<table width=\"100%\"><tr><td style=\"padding:6px 0;font-size:14px;color:#888;width:100px;\">Cliente</td><td style=\"font-size:14px;font-weight:600;color:#222;\">{}</td></tr><tr><td style=\"padding:6px 0;font-size:14px;color:#888;\">Email</td><td style=\"font-size:14px;color:#222;\">{}</td></tr></table>{}",
                heading("Nuevo Pedido Recibido"),
                data.user_name,
                data.user_email,
                detail
            ),
        );
        let client_html = wrap_with_order_ref(
            &self.app_name,
            self.logo_url.as_deref(),
            &reference,
            &format!(
                "{}<p style=\"margin:0 0 6px;font-size:14px;color:#555555;line-height:1.7;\">Tu pedido ha sido recibido correctamente y lo estamos procesando.</p>{}",
                heading("¡Gracias por tu compra!"),
                detail
            ),
        );

        // Both recipients are attempted even when one fails.
        let (admin_result, client_result) = future::join(
            self.send_html(
                &self.admin_email,
                &format!("Nuevo pedido #{} - {}", reference, self.app_name),
                admin_html,
                Vec::new(),
            ),
            async {
                if data.email_notifications {
                    self.send_html(
                        &data.user_email,
                        &format!("Pedido recibido #{} - {}", reference, self.app_name),
                        client_html,
                        Vec::new(),
                    )
                    .await
                } else {
                    Ok(())
                }
            },
        )
        .await;

        settle("order created", admin_result, client_result)
    }

    /// Status-change notification for every status except `paid` (which
    /// gets the invoice email instead).
    #[instrument(skip(self, data), fields(order_id = %data.order_id))]
    pub async fn send_order_updated(&self, data: &OrderEmailData) -> Result<(), ServiceError> {
        let reference = order_ref(data.order_id);
        let detail = full_order_detail(data);
        let status = data.status.unwrap_or(OrderStatus::Pending);

        let admin_html = wrap_with_order_ref(
            &self.app_name,
            self.logo_url.as_deref(),
            &reference,
            &format!(
                "{}<table width=\"100%\"><tr><td style=\"padding:6px 0;font-size:14px;color:#888;width:120px;\">Nuevo estado</td><td style=\"font-size:14px;font-weight:600;color:#222;\">{}</td></tr><tr><td style=\"padding:6px 0;font-size:14px;color:#888;\">Cliente</td><td style=\"font-size:14px;color:#222;\">{}</td></tr></table>{}",
                heading("Pedido Actualizado"),
                status_label(status),
                data.user_name,
                detail
            ),
        );
        let (title, message) = status_copy(status);
        let client_html = wrap_with_order_ref(
            &self.app_name,
            self.logo_url.as_deref(),
            &reference,
            &format!(
                "{}<p style=\"margin:0 0 20px;font-size:14px;color:#555555;line-height:1.7;\">{}</p>{}",
                heading(title),
                message,
                detail
            ),
        );

        let (admin_result, client_result) = future::join(
            self.send_html(
                &self.admin_email,
                &format!("Pedido #{} actualizado - {}", reference, self.app_name),
                admin_html,
                Vec::new(),
            ),
            async {
                if data.email_notifications {
                    self.send_html(
                        &data.user_email,
                        &format!("{} #{} - {}", title, reference, self.app_name),
                        client_html,
                        Vec::new(),
                    )
                    .await
                } else {
                    Ok(())
                }
            },
        )
        .await;

        settle("order updated", admin_result, client_result)
    }

    /// Invoice email pair. The customer (if opted in) gets the PDF; the
    /// admin copy always goes out and carries both the PDF and the CSV.
    #[instrument(skip(self, data), fields(order_id = %data.order_id, invoice = %data.invoice_number))]
    pub async fn send_invoice_emails(&self, data: &InvoiceEmailData) -> Result<(), ServiceError> {
        let reference = order_ref(data.order_id);

        let client_html = wrap_with_order_ref(
            &self.app_name,
            self.logo_url.as_deref(),
            &reference,
            &format!(
                "{}<p style=\"margin:0 0 16px;font-size:14px;color:#555555;line-height:1.7;\">Tu pago ha sido procesado exitosamente. Estamos preparando tu pedido.</p><p style=\"margin:0 0 20px;font-size:14px;color:#555555;line-height:1.7;\">Adjunto encontrarás tu factura <strong>{}</strong> con el detalle completo de la compra, incluyendo el IVA del 19% incluido en los precios.</p>",
                heading("¡Pedido Confirmado!"),
                data.invoice_number
            ),
        );

        let admin_html = wrap_with_order_ref(
            &self.app_name,
            self.logo_url.as_deref(),
            &reference,
            &format!(
                "{}<table width=\"100%\"><tr><td style=\"padding:6px 0;font-size:14px;color:#888;width:120px;\">Factura</td><td style=\"font-size:14px;font-weight:600;color:#222;\">{}</td></tr><tr><td style=\"padding:6px 0;font-size:14px;color:#888;\">Cliente</td><td style=\"font-size:14px;color:#222;\">{}</td></tr></table><p style=\"margin:16px 0 0;font-size:13px;color:#555555;line-height:1.7;\">Adjunto encontrarás la factura en PDF y el registro en CSV.</p>",
                heading("Nuevo Pago Confirmado"),
                data.invoice_number,
                data.user_name
            ),
        );
        let (client_result, admin_result) = future::join(
            async {
                if data.email_notifications {
                    self.send_html(
                        &data.user_email,
                        &format!("¡Pedido Confirmado! #{} - {}", reference, self.app_name),
                        client_html,
                        vec![(
                            format!("{}.pdf", data.invoice_number),
                            "application/pdf",
                            data.pdf.clone(),
                        )],
                    )
                    .await
                } else {
                    Ok(())
                }
            },
            self.send_html(
                &self.admin_email,
                &format!(
                    "Pedido pagado #{} — Factura {} - {}",
                    reference, data.invoice_number, self.app_name
                ),
                admin_html,
                vec![
                    (
                        format!("{}.pdf", data.invoice_number),
                        "application/pdf",
                        data.pdf.clone(),
                    ),
                    (
                        format!("{}.csv", data.invoice_number),
                        "text/csv",
                        data.csv.clone().into_bytes(),
                    ),
                ],
            ),
        )
        .await;

        settle("invoice", admin_result, client_result)
    }
}

/// Logs each failed leg of an email pair and reports overall failure when
/// either leg failed, so the worker's metrics reflect it.
fn settle(
    context: &str,
    admin_result: Result<(), ServiceError>,
    client_result: Result<(), ServiceError>,
) -> Result<(), ServiceError> {
    if let Err(e) = &admin_result {
        error!(error = %e, context = context, "admin email failed");
    }
    if let Err(e) = &client_result {
        error!(error = %e, context = context, "customer email failed");
    }

    admin_result.and(client_result)
}

fn order_ref(order_id: Uuid) -> String {
    crate::services::invoicing::order_reference(order_id)
}

fn heading(text: &str) -> String {
    format!(
        "<h2 style=\"margin:0 0 12px;font-size:22px;color:#222222;\">{}</h2>",
        text
    )
}

/// Customer-facing title and message per status (the `paid` entry is used
/// only as a defensive fallback; paid transitions send invoices instead).
pub fn status_copy(status: OrderStatus) -> (&'static str, &'static str) {
    match status {
        OrderStatus::Paid => (
            "¡Pedido Confirmado!",
            "Tu pago ha sido procesado exitosamente. Estamos preparando tu pedido.",
        ),
        OrderStatus::InPreparation => (
            "Pedido en Preparación",
            "Tu pedido está siendo preparado con mucho cuidado.",
        ),
        OrderStatus::Ready => (
            "¡Tu Pedido Está Listo!",
            "Tu pedido está listo y será entregado pronto.",
        ),
        OrderStatus::Delivered => (
            "¡Pedido Entregado!",
            "¡Esperamos que disfrutes tu compra! Si tienes algún inconveniente, contáctanos.",
        ),
        OrderStatus::Canceled => (
            "Pedido Cancelado",
            "Tu pedido ha sido cancelado. Si tienes preguntas, no dudes en contactarnos.",
        ),
        OrderStatus::Rejected => (
            "Pedido Rechazado",
            "Tu pedido ha sido rechazado. Por favor contáctanos para más información.",
        ),
        OrderStatus::Pending => (
            "Pedido Recibido",
            "Tu pedido ha sido recibido y está pendiente de confirmación.",
        ),
    }
}

/// Admin-facing status label.
pub fn status_label(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Pending => "Pendiente",
        OrderStatus::Paid => "Pagado",
        OrderStatus::InPreparation => "En Preparación",
        OrderStatus::Ready => "Listo para Entrega",
        OrderStatus::Delivered => "Entregado",
        OrderStatus::Canceled => "Cancelado",
        OrderStatus::Rejected => "Rechazado",
    }
}

fn divider() -> &'static str {
    "<hr style=\"border:none;border-top:1px solid #eeeeee;margin:24px 0;\">"
}

fn section_title(text: &str) -> String {
    format!(
        "<p style=\"margin:0 0 16px;font-size:15px;font-weight:700;color:#222222;\">{}</p>",
        text
    )
}

fn items_table(items: &[EmailLineItem]) -> String {
    let rows: String = items
        .iter()
        .map(|item| {
            format!(
                "<tr><td style=\"padding:12px 0;border-bottom:1px solid #eeeeee;font-size:14px;color:#333333;\">{} × {}</td><td style=\"padding:12px 0;border-bottom:1px solid #eeeeee;font-size:14px;font-weight:600;color:#222222;text-align:right;\">{}</td></tr>",
                item.name,
                item.quantity,
                crate::services::invoicing::format_cop(item.price * i64::from(item.quantity)),
            )
        })
        .collect();

    format!("<table width=\"100%\" cellpadding=\"0\" cellspacing=\"0\">{}</table>", rows)
}

fn totals_table(data: &OrderEmailData) -> String {
    use crate::services::invoicing::format_cop;

    let discount_cell = if data.discount > 0 {
        format!("-{}", format_cop(data.discount))
    } else {
        "-".to_string()
    };

    format!(
        "<table width=\"100%\" cellpadding=\"0\" cellspacing=\"0\" style=\"margin-top:4px;\">\
         <tr><td style=\"padding:6px 0;font-size:14px;color:#555555;\">Subtotal</td><td style=\"padding:6px 0;font-size:14px;font-weight:600;color:#222222;text-align:right;\">{}</td></tr>\
         <tr><td style=\"padding:6px 0;font-size:14px;color:#555555;\">Envío</td><td style=\"padding:6px 0;font-size:14px;font-weight:600;color:#222222;text-align:right;\">{}</td></tr>\
         <tr><td style=\"padding:6px 0;font-size:14px;color:#555555;\">Descuento</td><td style=\"padding:6px 0;font-size:14px;font-weight:600;color:#222222;text-align:right;\">{}</td></tr>\
         <tr><td style=\"padding:16px 0 4px;font-size:15px;color:#222222;border-top:1px solid #dddddd;\">Total</td><td style=\"padding:16px 0 4px;font-size:20px;font-weight:700;color:#222222;text-align:right;border-top:1px solid #dddddd;\">{}</td></tr>\
         </table>",
        format_cop(data.subtotal),
        format_cop(data.shipping_fee),
        discount_cell,
        format_cop(data.total),
    )
}

fn address_block(data: &OrderEmailData) -> String {
    let phone = data
        .shipping_phone_number
        .as_deref()
        .map(|p| format!("{}<br>", p))
        .unwrap_or_default();

    format!(
        "<p style=\"margin:0 0 8px;font-size:13px;font-weight:700;color:#333333;\">Dirección de envío</p>\
         <p style=\"margin:0;font-size:13px;color:#555555;line-height:1.8;\">{}<br>{}{}<br>{}<br>Colombia</p>",
        data.shipping_full_name, phone, data.shipping_street_address, data.shipping_city,
    )
}

fn full_order_detail(data: &OrderEmailData) -> String {
    format!(
        "{}{}{}{}{}{}{}",
        divider(),
        section_title("Resumen del pedido"),
        items_table(&data.items),
        totals_table(data),
        divider(),
        section_title("Información del cliente"),
        address_block(data),
    )
}

/// Shared outer shell with the order reference in the header.
fn wrap_with_order_ref(
    app_name: &str,
    logo_url: Option<&str>,
    order_reference: &str,
    body: &str,
) -> String {
    let logo = logo_url
        .map(|url| {
            format!(
                "<img src=\"{}\" alt=\"{}\" height=\"64\" style=\"display:block;\">",
                url, app_name
            )
        })
        .unwrap_or_else(|| {
            format!(
                "<span style=\"font-size:20px;font-weight:700;color:#C34928;\">{}</span>",
                app_name
            )
        });

    format!(
        "<!DOCTYPE html><html lang=\"es\"><head><meta charset=\"UTF-8\"></head>\
         <body style=\"margin:0;padding:0;background-color:#f5f5f5;font-family:Arial,sans-serif;\">\
         <table width=\"100%\" cellpadding=\"0\" cellspacing=\"0\" style=\"background-color:#f5f5f5;padding:32px 16px;\"><tr><td align=\"center\">\
         <table width=\"600\" cellpadding=\"0\" cellspacing=\"0\" style=\"background-color:#ffffff;border-radius:6px;border:1px solid #e8e8e8;\">\
         <tr><td style=\"padding:20px 32px;border-bottom:1px solid #eeeeee;\">\
         <table width=\"100%\"><tr><td>{}</td>\
         <td style=\"text-align:right;font-size:13px;color:#888888;vertical-align:middle;\">PEDIDO #{}</td></tr></table>\
         </td></tr>\
         <tr><td style=\"padding:32px;\">{}</td></tr>\
         <tr><td style=\"padding:20px 32px;border-top:1px solid #eeeeee;text-align:center;background-color:#fafafa;\">\
         <p style=\"margin:0;font-size:12px;color:#aaaaaa;line-height:1.8;\">Este correo fue enviado automáticamente. Por favor no respondas a este mensaje.<br>© {} {}. Todos los derechos reservados.</p>\
         </td></tr></table></td></tr></table></body></html>",
        logo,
        order_reference,
        body,
        chrono::Utc::now().format("%Y"),
        app_name,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_data() -> OrderEmailData {
        OrderEmailData {
            order_id: Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap(),
            status: Some(OrderStatus::Ready),
            user_email: "ana@example.com".to_string(),
            user_name: "Ana Gómez".to_string(),
            items: vec![EmailLineItem {
                name: "Palito de queso".to_string(),
                quantity: 4,
                price: 10_000,
            }],
            subtotal: 40_000,
            shipping_fee: 10_000,
            discount: 0,
            total: 50_000,
            shipping_full_name: "Ana Gómez".to_string(),
            shipping_street_address: "Calle 10 # 4-32".to_string(),
            shipping_city: "Medellín".to_string(),
            shipping_phone_number: Some("3001234567".to_string()),
            email_notifications: true,
        }
    }

    #[test]
    fn detail_block_contains_items_and_totals() {
        let html = full_order_detail(&sample_data());
        assert!(html.contains("Palito de queso × 4"));
        assert!(html.contains("$40.000 COP"));
        assert!(html.contains("$50.000 COP"));
        assert!(html.contains("Dirección de envío"));
    }

    #[test]
    fn discount_renders_only_when_present() {
        let mut data = sample_data();
        assert!(totals_table(&data).contains(">-<"));

        data.discount = 7_500;
        assert!(totals_table(&data).contains("-$7.500 COP"));
    }

    #[test]
    fn wrapper_carries_order_reference() {
        let html = wrap_with_order_ref("Don Palito Jr", None, "55440000", "<p>hola</p>");
        assert!(html.contains("PEDIDO #55440000"));
        assert!(html.contains("Don Palito Jr"));
    }

    #[test]
    fn every_status_has_customer_copy() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Paid,
            OrderStatus::InPreparation,
            OrderStatus::Ready,
            OrderStatus::Delivered,
            OrderStatus::Canceled,
            OrderStatus::Rejected,
        ] {
            let (title, message) = status_copy(status);
            assert!(!title.is_empty());
            assert!(!message.is_empty());
            assert!(!status_label(status).is_empty());
        }
    }
}
