//! RFC 5322 reading and writing for spooled mail.

use chrono::{DateTime, Utc};
use mailparse::{MailAddr, MailHeaderMap, ParsedMail};
use thiserror::Error;

use freightq_core::ports::{InboundMessage, OutboundMail};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MessageError {
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("message has no readable text body")]
    NoTextBody,
}

/// `true` for `local@domain.tld` shaped strings.
fn looks_like_address(candidate: &str) -> bool {
    match candidate.rsplit_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.'),
        None => false,
    }
}

/// Splits a `From` header into display name and reply address.
///
/// The parsed address is used when it looks like an email address; otherwise
/// the raw header value is kept. The name falls back to the address.
pub fn normalize_sender(raw_from: &str) -> (String, String) {
    let raw = raw_from.trim();
    let single = mailparse::addrparse(raw).ok().and_then(|list| {
        list.iter().find_map(|entry| match entry {
            MailAddr::Single(info) => Some(info.clone()),
            MailAddr::Group(group) => group.addrs.first().cloned(),
        })
    });

    match single {
        Some(info) => {
            let address =
                if looks_like_address(&info.addr) { info.addr.clone() } else { raw.to_owned() };
            let name = info
                .display_name
                .map(|name| name.trim().to_owned())
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| info.addr.clone());
            (name, address)
        }
        None => (raw.to_owned(), raw.to_owned()),
    }
}

/// Header values are read as UTF-8 first, then as Latin-1.
fn header_text(headers: &impl MailHeaderMap, name: &str) -> Option<String> {
    headers
        .get_first_header(name)
        .map(|header| header.get_value_utf8().unwrap_or_else(|_| header.get_value()))
}

fn text_body(part: &ParsedMail<'_>) -> Option<String> {
    if part.subparts.is_empty() {
        let mimetype = part.ctype.mimetype.to_ascii_lowercase();
        if mimetype.starts_with("text/plain") || mimetype.is_empty() {
            return part.get_body().ok();
        }
        return None;
    }
    part.subparts.iter().find_map(text_body)
}

/// Reads a spooled message. `fallback_received` is used when the `Date`
/// header is missing or unparsable.
pub fn parse_eml(
    message_ref: &str,
    raw: &[u8],
    fallback_received: DateTime<Utc>,
) -> Result<InboundMessage, MessageError> {
    let parsed =
        mailparse::parse_mail(raw).map_err(|error| MessageError::Malformed(error.to_string()))?;
    let headers = parsed.get_headers();

    let from = header_text(&headers, "From").unwrap_or_default();
    let (sender_name, sender_address) = normalize_sender(&from);
    let subject = header_text(&headers, "Subject").unwrap_or_default();
    let received_at = header_text(&headers, "Date")
        .and_then(|value| mailparse::dateparse(&value).ok())
        .and_then(|timestamp| DateTime::<Utc>::from_timestamp(timestamp, 0))
        .unwrap_or(fallback_received);
    let body = text_body(&parsed).ok_or(MessageError::NoTextBody)?;

    Ok(InboundMessage {
        message_ref: message_ref.to_owned(),
        body,
        sender_name,
        sender_address,
        received_at,
        subject,
    })
}

/// Plain-text UTF-8 rendition of an outbound mail. Attachments are listed in
/// `X-Attachment` headers and stored next to the message by the spool.
pub fn compose_eml(
    mail: &OutboundMail,
    from: &str,
    message_id: &str,
    date: DateTime<Utc>,
    attachment_names: &[String],
) -> String {
    let mut lines = vec![
        format!("From: {}", single_line(from)),
        format!("To: {}", single_line(&mail.to)),
        format!("Subject: {}", single_line(&mail.subject)),
        format!("Date: {}", date.to_rfc2822()),
        format!("Message-ID: <{message_id}>"),
        "MIME-Version: 1.0".to_owned(),
        "Content-Type: text/plain; charset=utf-8".to_owned(),
        "Content-Transfer-Encoding: 8bit".to_owned(),
    ];
    lines.extend(attachment_names.iter().map(|name| format!("X-Attachment: {}", single_line(name))));
    lines.push(String::new());
    lines.extend(mail.body.lines().map(str::to_owned));

    let mut eml = lines.join("\r\n");
    eml.push_str("\r\n");
    eml
}

fn single_line(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}
