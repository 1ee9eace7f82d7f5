//! Server-rendered HTML pages.

use std::fmt::Write as _;

use consultation_report::report::DATE_OF_BIRTH_FORMAT;
use consultation_report::{ConsultationForm, ConsultationReport, Field, FormErrors};

const STYLE: &str = r#"
body { font-family: -apple-system, "Segoe UI", Roboto, sans-serif; background: #f3f4f6; color: #111827; margin: 0; }
main { max-width: 760px; margin: 32px auto; background: #fff; padding: 32px; border-radius: 8px; box-shadow: 0 1px 3px rgba(0,0,0,.1); }
h1 { color: #1e40af; margin-top: 0; }
label { display: block; font-weight: 600; margin: 16px 0 4px; }
input, textarea { width: 100%; box-sizing: border-box; padding: 8px; border: 1px solid #d1d5db; border-radius: 4px; font: inherit; }
textarea { min-height: 120px; }
.invalid { border-color: #dc2626; }
.errors { color: #dc2626; font-size: .9em; margin: 4px 0 0; padding-left: 18px; }
.banner { background: #fee2e2; color: #991b1b; padding: 12px; border-radius: 4px; }
button { margin-top: 24px; background: #1e40af; color: #fff; border: 0; padding: 10px 20px; border-radius: 4px; font-size: 1em; cursor: pointer; }
dl { display: grid; grid-template-columns: max-content 1fr; gap: 6px 16px; }
dt { font-weight: 600; }
pre { white-space: pre-wrap; border: 1px solid #d1d5db; padding: 12px; border-radius: 4px; font: inherit; }
table { width: 100%; border-collapse: collapse; }
td, th { text-align: left; padding: 6px; border-bottom: 1px solid #e5e7eb; }
"#;

const LIVE_VALIDATION_SCRIPT: &str = r#"
document.querySelectorAll('[data-validate]').forEach(function (input) {
  input.addEventListener('blur', function () {
    fetch('/validate/', {
      method: 'POST',
      headers: { 'Content-Type': 'application/json' },
      body: JSON.stringify({ field: input.name, value: input.value })
    })
      .then(function (response) { return response.json(); })
      .then(function (result) {
        var list = document.getElementById('errors-' + input.name);
        list.innerHTML = '';
        result.errors.forEach(function (message) {
          var item = document.createElement('li');
          item.textContent = message;
          list.appendChild(item);
        });
        input.classList.toggle('invalid', !result.valid);
      });
  });
});
"#;

/// Escapes text for use in element content and quoted attribute values.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

fn layout(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{title}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n<main>\n{body}</main>\n</body>\n</html>\n",
        title = escape_html(title),
    )
}

fn field_input(form: &ConsultationForm, field: Field) -> String {
    let name = field.name();
    match field {
        Field::ClinicLogo => format!(
            "<input type=\"file\" id=\"{name}\" name=\"{name}\" accept=\"image/jpeg,image/png,image/gif,image/webp\">"
        ),
        Field::PatientDob => format!(
            "<input type=\"date\" id=\"{name}\" name=\"{name}\" value=\"{}\" required data-validate>",
            escape_html(form.value(field))
        ),
        _ if field.is_text_area() => format!(
            "<textarea id=\"{name}\" name=\"{name}\" required data-validate>{}</textarea>",
            escape_html(form.value(field))
        ),
        _ => format!(
            "<input type=\"text\" id=\"{name}\" name=\"{name}\" value=\"{}\" maxlength=\"255\" required data-validate>",
            escape_html(form.value(field))
        ),
    }
}

/// The data-entry form, optionally with errors and a banner message.
pub fn form_page(
    form: &ConsultationForm,
    errors: Option<&FormErrors>,
    banner: Option<&str>,
) -> String {
    let mut body = String::from("<h1>Consultation Report Generator</h1>\n");

    if let Some(message) = banner {
        let _ = writeln!(body, "<p class=\"banner\">{}</p>", escape_html(message));
    }

    body.push_str(
        "<form method=\"post\" action=\"/\" enctype=\"multipart/form-data\" novalidate>\n",
    );
    for field in Field::ALL {
        let messages = errors.map(|errors| errors.get(field)).unwrap_or_default();
        let mut input = field_input(form, field);
        if !messages.is_empty() {
            input = input.replacen(" name=", " class=\"invalid\" name=", 1);
        }

        let _ = writeln!(
            body,
            "<label for=\"{name}\">{label}</label>\n{input}",
            name = field.name(),
            label = escape_html(field.label()),
        );
        let _ = write!(body, "<ul class=\"errors\" id=\"errors-{}\">", field.name());
        for message in messages {
            let _ = write!(body, "<li>{}</li>", escape_html(message));
        }
        body.push_str("</ul>\n");
    }
    body.push_str("<button type=\"submit\">Generate PDF report</button>\n</form>\n");
    let _ = writeln!(body, "<script>{LIVE_VALIDATION_SCRIPT}</script>");

    layout("Consultation Report Generator", &body)
}

/// Read-only view of a stored report.
pub fn preview_page(report: &ConsultationReport) -> String {
    let details = &report.details;
    let rows = [
        ("Clinic Name", details.clinic_name.clone()),
        ("Physician Name", details.physician_name.clone()),
        ("Physician Contact", details.physician_contact.clone()),
        ("Patient Name", details.patient_full_name()),
        (
            "Date of Birth",
            details.patient_dob.format(DATE_OF_BIRTH_FORMAT).to_string(),
        ),
        ("Patient Contact", details.patient_contact.clone()),
        (
            "Created",
            report.created_at.format("%Y-%m-%d %H:%M UTC").to_string(),
        ),
    ];

    let mut body = format!("<h1>{}</h1>\n<dl>\n", escape_html(&report.to_string()));
    for (label, value) in rows {
        let _ = writeln!(body, "<dt>{label}</dt><dd>{}</dd>", escape_html(&value));
    }
    body.push_str("</dl>\n");
    for (title, text) in [
        ("Chief Complaint", &details.chief_complaint),
        ("Consultation Note", &details.consultation_note),
    ] {
        let _ = writeln!(body, "<h2>{title}</h2>\n<pre>{}</pre>", escape_html(text));
    }
    let _ = writeln!(
        body,
        "<p><a href=\"/reports/{id}/pdf\">Download PDF</a> · <a href=\"/\">New report</a></p>",
        id = report.id
    );

    layout(&report.to_string(), &body)
}

/// Recent reports with links to their previews.
pub fn list_page(reports: &[ConsultationReport]) -> String {
    let mut body = String::from("<h1>Consultation Reports</h1>\n");
    if reports.is_empty() {
        body.push_str("<p>No reports yet.</p>\n");
    } else {
        body.push_str("<table>\n<tr><th>Patient</th><th>Clinic</th><th>Created</th></tr>\n");
        for report in reports {
            let _ = writeln!(
                body,
                "<tr><td><a href=\"/reports/{id}\">{patient}</a></td><td>{clinic}</td><td>{created}</td></tr>",
                id = report.id,
                patient = escape_html(&report.patient_full_name()),
                clinic = escape_html(&report.details.clinic_name),
                created = report.created_at.format("%Y-%m-%d %H:%M"),
            );
        }
        body.push_str("</table>\n");
    }
    body.push_str("<p><a href=\"/\">New report</a></p>\n");
    layout("Consultation Reports", &body)
}
