use std::fmt::Write;

#[derive(Clone, Debug, Default)]
pub struct FormPage {
    pub title: String,
    pub action_url: String,
    pub fields: Vec<FormField>,
    pub errors: Vec<String>,
    pub submit_label: String,
}

#[derive(Clone, Debug)]
pub struct FormField {
    pub name: String,
    pub label: String,
    pub value: String,
    pub kind: FieldKind,
}

#[derive(Clone, Debug)]
pub enum FieldKind {
    Text,
    Number,
    Checkbox,
    Select(Vec<(String, String)>),
}

pub fn render_form(page: &FormPage) -> String {
    let mut html = String::new();
    writeln!(
        html,
        "<section class=\"admin_form\"><h2>{}</h2>",
        page.title
    )
    .ok();

    if !page.errors.is_empty() {
        html.push_str("<ul class=\"form_errors\">");
        for error in &page.errors {
            writeln!(html, "<li>{}</li>", error).ok();
        }
        html.push_str("</ul>");
    }

    writeln!(
        html,
        "<form method=\"post\" action=\"{}\">",
        page.action_url
    )
    .ok();
    for field in &page.fields {
        match &field.kind {
            FieldKind::Text => {
                writeln!(
                    html,
                    "<label>{} <input type=\"text\" name=\"{}\" value=\"{}\"></label>",
                    field.label, field.name, field.value
                )
                .ok();
            }
            FieldKind::Number => {
                writeln!(
                    html,
                    "<label>{} <input type=\"number\" name=\"{}\" value=\"{}\"></label>",
                    field.label, field.name, field.value
                )
                .ok();
            }
            FieldKind::Checkbox => {
                let checked = if field.value == "true" { "checked" } else { "" };
                writeln!(
                    html,
                    "<label><input type=\"checkbox\" name=\"{}\" {}> {}</label>",
                    field.name, checked, field.label
                )
                .ok();
            }
            FieldKind::Select(options) => {
                writeln!(html, "<label>{} <select name=\"{}\">", field.label, field.name).ok();
                for (value, label) in options {
                    let selected = if *value == field.value { "selected" } else { "" };
                    writeln!(
                        html,
                        "<option value=\"{}\" {}>{}</option>",
                        value, selected, label
                    )
                    .ok();
                }
                html.push_str("</select></label>");
            }
        }
    }
    writeln!(
        html,
        "<button type=\"submit\" name=\"save\" value=\"1\">{}</button></form></section>",
        page.submit_label
    )
    .ok();
    html
}

/// Confirmation interstitial for deletes and refunds.
pub fn render_confirm(message: &str, action_url: &str) -> String {
    let mut html = String::from("<section class=\"confirm\">");
    writeln!(html, "<p>{}</p>", message).ok();
    writeln!(
        html,
        "<form method=\"post\" action=\"{}\"><input type=\"hidden\" name=\"confirm\" value=\"1\"><button type=\"submit\">Confirm</button></form>",
        action_url
    )
    .ok();
    html.push_str("</section>");
    html
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_fields_and_errors() {
        let page = FormPage {
            title: "Edit gift".into(),
            action_url: "/admin?area=gifts;sa=edit;gift=1".into(),
            fields: vec![
                FormField {
                    name: "name".into(),
                    label: "Name".into(),
                    value: "Cinema ticket".into(),
                    kind: FieldKind::Text,
                },
                FormField {
                    name: "cost_coins".into(),
                    label: "Cost".into(),
                    value: "300".into(),
                    kind: FieldKind::Number,
                },
                FormField {
                    name: "audience".into(),
                    label: "Audience".into(),
                    value: "parents".into(),
                    kind: FieldKind::Select(vec![
                        ("all".into(), "Everyone".into()),
                        ("parents".into(), "Parents".into()),
                    ]),
                },
            ],
            errors: vec!["gift_cost".into()],
            submit_label: "Save".into(),
        };
        let html = render_form(&page);
        assert!(html.contains("value=\"Cinema ticket\""));
        assert!(html.contains("<li>gift_cost</li>"));
        assert!(html.contains("<option value=\"parents\" selected>"));
    }

    #[test]
    fn confirm_prompt_carries_the_flag() {
        let html = render_confirm("Delete Sticker pack?", "/admin?area=gifts;sa=delete;gift=2");
        assert!(html.contains("Delete Sticker pack?"));
        assert!(html.contains("name=\"confirm\""));
    }
}
