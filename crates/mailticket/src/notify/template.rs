//! Confirmation message text.

use std::fmt::Write;

use crate::tickets::{Priority, Ticket};

/// Key points included in the confirmation.
const MAX_KEY_POINTS: usize = 3;
const RULE: &str = "----------------------------------------";

pub fn subject(ticket: &Ticket) -> String {
    format!("Your Support Ticket #{} - Confirmed", ticket.ticket_number)
}

fn priority_marker(priority: Priority) -> &'static str {
    match priority {
        Priority::High => "[!]",
        Priority::Medium => "[-]",
        Priority::Low => "[ ]",
    }
}

fn title_case(text: &str) -> String {
    text.split('-')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Plain-text confirmation body.
pub fn plain_text_body(ticket: &Ticket) -> String {
    let mut body = String::new();
    let category = ticket.category.map(|c| c.as_str()).unwrap_or("Pending review");

    // Writing to a String cannot fail.
    let _ = writeln!(body, "Hello {},", ticket.greeting_name());
    let _ = writeln!(body);
    let _ = writeln!(
        body,
        "Thank you for contacting us! Your support request has been received and a ticket has been created."
    );
    let _ = writeln!(body);
    let _ = writeln!(body, "TICKET DETAILS");
    let _ = writeln!(body, "{RULE}");
    let _ = writeln!(body);
    let _ = writeln!(body, "Ticket Number:  {}", ticket.ticket_number);
    let _ = writeln!(body, "Status:         {}", title_case(ticket.status.as_str()));
    let _ = writeln!(
        body,
        "Priority:       {} {}",
        priority_marker(ticket.priority),
        ticket.priority
    );
    let _ = writeln!(body, "Category:       {category}");

    if let Some(summary) = &ticket.summary {
        let _ = writeln!(body);
        let _ = writeln!(body, "Summary:");
        let _ = writeln!(body, "{summary}");
    }

    if !ticket.key_points.is_empty() {
        let _ = writeln!(body);
        for point in ticket.key_points.iter().take(MAX_KEY_POINTS) {
            let _ = writeln!(body, "• {point}");
        }
    }

    let _ = writeln!(body);
    let _ = writeln!(body, "{RULE}");
    let _ = writeln!(body);
    let _ = writeln!(
        body,
        "Our team is reviewing your request and will get back to you shortly."
    );
    let _ = writeln!(body);
    let _ = writeln!(
        body,
        "Please reference ticket #{} in any follow-up communications.",
        ticket.ticket_number
    );
    let _ = writeln!(body);
    let _ = writeln!(body, "Best regards,");
    let _ = write!(body, "Support Team");
    body
}
