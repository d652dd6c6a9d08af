//! HTML pages for the interactive login step.

/// What the login page shows about the pending request.
#[derive(Debug, Clone, Copy)]
pub struct LoginPage<'a> {
    pub client_name: &'a str,
    pub client_id: &'a str,
    pub trusted: bool,
    pub scopes: &'a [String],
    pub error_message: Option<&'a str>,
}

/// Render the authorization login page.
///
/// All interpolated values are HTML-escaped. The request itself is not
/// embedded in the form: it travels in the signed parameter cookie.
#[must_use]
pub fn render_login_page(page: &LoginPage<'_>) -> String {
    let error_html = page
        .error_message
        .map(|msg| format!(r#"<div class="error">{}</div>"#, html_escape(msg)))
        .unwrap_or_default();

    let warning_html = if page.trusted {
        String::new()
    } else {
        r#"<div class="warning">This application registered itself and has not been reviewed by an administrator.</div>"#
            .to_string()
    };

    let scopes_html = if page.scopes.is_empty() {
        "<li>No data access</li>".to_string()
    } else {
        page.scopes
            .iter()
            .map(|s| format!("<li><code>{}</code></li>", html_escape(s)))
            .collect::<String>()
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width,initial-scale=1">
<title>Authorize - Dashboard</title>
<style>
body {{ font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif; background: #f5f5f5; margin: 0; display: flex; justify-content: center; align-items: center; min-height: 100vh; }}
.card {{ background: #fff; border-radius: 8px; box-shadow: 0 2px 8px rgba(0,0,0,0.1); padding: 32px; max-width: 420px; width: 100%; }}
h1 {{ font-size: 20px; margin: 0 0 8px; color: #333; }}
.subtitle {{ color: #666; font-size: 14px; margin: 0 0 16px; }}
.error {{ background: #fee; border: 1px solid #c00; color: #c00; padding: 10px; border-radius: 4px; margin-bottom: 16px; }}
.warning {{ background: #fff8e1; border: 1px solid #e0a800; color: #7a5b00; padding: 10px; border-radius: 4px; margin-bottom: 16px; font-size: 13px; }}
ul {{ font-size: 14px; color: #333; padding-left: 20px; }}
label {{ display: block; font-size: 14px; font-weight: 500; margin-bottom: 6px; color: #333; }}
input[type="password"] {{ width: 100%; padding: 10px; border: 1px solid #ddd; border-radius: 4px; font-size: 14px; box-sizing: border-box; }}
.actions {{ display: flex; gap: 8px; margin-top: 16px; }}
button {{ flex: 1; padding: 10px; border: none; border-radius: 4px; font-size: 14px; font-weight: 500; cursor: pointer; }}
button.approve {{ background: #4a90d9; color: #fff; }}
button.deny {{ background: #eee; color: #333; }}
</style>
</head>
<body>
<div class="card">
<h1>Dashboard</h1>
<p class="subtitle"><strong>{client_name}</strong> (<code>{client_id}</code>) is requesting access to:</p>
<ul>{scopes_html}</ul>
{warning_html}
{error_html}
<form method="POST" action="/mcp/authorize">
<label for="password">Dashboard Password</label>
<input type="password" id="password" name="password" placeholder="Enter your dashboard password" autofocus>
<div class="actions">
<button type="submit" class="deny" name="action" value="deny">Deny</button>
<button type="submit" class="approve" name="action" value="approve">Approve</button>
</div>
</form>
</div>
</body>
</html>"#,
        client_name = html_escape(page.client_name),
        client_id = html_escape(page.client_id),
    )
}

/// Render a terminal error page for a broken or expired login flow.
#[must_use]
pub fn render_error_page(message: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="utf-8"><title>Authorization failed - Dashboard</title></head>
<body style="font-family: sans-serif; padding: 32px">
<h1>Authorization failed</h1>
<p>{}</p>
<p>Return to the application and start the sign-in again.</p>
</body>
</html>"#,
        html_escape(message)
    )
}

/// Escape HTML special characters.
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}
