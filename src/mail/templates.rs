// src/mail/templates.rs
//
// Each template returns `(subject, html, text)`.

use chrono::{DateTime, Utc};

fn layout(title: &str, body: &str, cta_label: &str, cta_url: &str) -> String {
    format!(
        r##"<!DOCTYPE html>
<html lang="es">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
</head>
<body style="margin: 0; padding: 0; font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Arial, sans-serif; background-color: #f4f4f5; color: #18181b;">
    <table role="presentation" style="width: 100%; border-collapse: collapse;">
        <tr>
            <td style="padding: 32px 16px;">
                <table role="presentation" style="max-width: 560px; margin: 0 auto; background: #ffffff; border-radius: 12px; border: 1px solid #e4e4e7;">
                    <tr>
                        <td style="padding: 32px 32px 8px; text-align: center;">
                            <span style="font-size: 22px; font-weight: 700; color: #16a34a;">Trueke</span>
                            <h1 style="margin: 16px 0 0; font-size: 22px; line-height: 1.3;">{title}</h1>
                        </td>
                    </tr>
                    <tr>
                        <td style="padding: 24px 32px; font-size: 15px; line-height: 1.6; color: #3f3f46;">
                            {body}
                        </td>
                    </tr>
                    <tr>
                        <td style="padding: 0 32px 32px; text-align: center;">
                            <a href="{cta_url}" style="display: inline-block; background: #16a34a; color: #ffffff; text-decoration: none; font-weight: 600; padding: 12px 24px; border-radius: 8px;">{cta_label}</a>
                        </td>
                    </tr>
                </table>
            </td>
        </tr>
    </table>
</body>
</html>"##
    )
}

fn days_phrase(days_left: i64) -> String {
    if days_left <= 1 {
        "mañana".to_string()
    } else {
        format!("en {days_left} días")
    }
}

pub fn product_expiry(product_title: &str, days_left: i64, app_url: &str) -> (String, String, String) {
    let when = days_phrase(days_left);
    let subject = format!("Tu producto \"{product_title}\" expira {when}");
    let url = format!("{}/my-products", app_url.trim_end_matches('/'));

    let html = layout(
        "Tu producto está a punto de expirar",
        &format!(
            "<p>Tu producto <strong>{product_title}</strong> dejará de mostrarse {when}.</p>\
             <p>Renuévalo para seguir recibiendo propuestas de intercambio.</p>"
        ),
        "Ver mis productos",
        &url,
    );
    let text = format!(
        "Tu producto \"{product_title}\" dejará de mostrarse {when}.\n\
         Renuévalo para seguir recibiendo propuestas: {url}"
    );

    (subject, html, text)
}

pub fn subscription_expiry(
    plan_name: &str,
    expires_at: DateTime<Utc>,
    app_url: &str,
) -> (String, String, String) {
    let date = expires_at.format("%d/%m/%Y");
    let subject = format!("Tu suscripción {plan_name} vence pronto");
    let url = format!("{}/premium", app_url.trim_end_matches('/'));

    let html = layout(
        "Tu suscripción vence pronto",
        &format!(
            "<p>Tu plan <strong>{plan_name}</strong> vence el <strong>{date}</strong>.</p>\
             <p>Renueva para no perder tus Super Likes, Boosts y Rewinds.</p>"
        ),
        "Renovar suscripción",
        &url,
    );
    let text = format!("Tu plan {plan_name} vence el {date}. Renueva en {url}");

    (subject, html, text)
}

pub fn test_email(provider: &str) -> (String, String, String) {
    let subject = "Correo de prueba de Trueke".to_string();
    let html = layout(
        "Correo de prueba",
        &format!("<p>Si lees esto, el proveedor <strong>{provider}</strong> está bien configurado.</p>"),
        "Abrir Trueke",
        "https://trueke.app",
    );
    let text = format!("Si lees esto, el proveedor {provider} está bien configurado.");

    (subject, html, text)
}
