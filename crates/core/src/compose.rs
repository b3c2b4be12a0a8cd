//! Carrier-facing mail bodies.
//!
//! The request mail doubles as the reply form: carriers fill in the cost
//! lines and send it back, so its labels must stay in step with the parser.

use std::path::PathBuf;

use crate::domain::bid::Bid;
use crate::domain::catalog::CostItem;
use crate::domain::offer::Offer;
use crate::ports::OutboundMail;

const REQUEST_INSTRUCTIONS: [&str; 5] = [
    "Уважаемый партнер,",
    "срок предоставления ответа до 15:00 следующего дня, заявки, полученные позже будут отклонены автоматически.",
    "Для корректного заполнения заявки необходимо в ответном сообщении заполнить форму заявки, не меняя текст сообщения,",
    "указать стоимость, валюту в формате \"RUB\" или \"USD\", очередность полей не менять, не удалять и не добавлять.",
    "При необходимости дополнить информацию в поле \"Примечания\"",
];

const UNSET_ORDER_NUMBER: &str = "Не указан";

pub fn request_subject(bid: &Bid) -> String {
    format!("Новая заявка {}", bid.id)
}

pub fn request_body(bid: &Bid) -> String {
    let details = &bid.details;
    let order_number =
        if bid.order_number.trim().is_empty() { UNSET_ORDER_NUMBER } else { bid.order_number.as_str() };

    let mut lines: Vec<String> = REQUEST_INSTRUCTIONS.iter().map(|line| (*line).to_owned()).collect();
    lines.push(String::new());
    lines.push(format!("ID заявки: {}", bid.id));
    lines.push(format!("Номер заказа: {order_number}"));
    lines.push(format!("Страна отправки: {}", details.country_from));
    lines.push(format!("Условие отгрузки: {}", details.incoterm));
    lines.push(format!("Порт отправки: {}", details.port_from));
    lines.push(format!("Дата готовности груза: {}", details.ready_date));
    lines.push(format!("Тип контейнера: {}", details.container_type));
    lines.push(format!("Способ доставки: {}", details.delivery_method));
    lines.push(format!("Груз: {}", details.cargo_type));
    lines.push(format!("Код ТНВЭД: {}", details.hs_code));
    lines.push(String::new());
    lines.push("Описание груза:".to_owned());
    lines.push(format!("Адрес погрузки: {}", details.loading_address));
    lines.push(String::new());
    lines.push("Расчет стоимости:".to_owned());

    for item in CostItem::CATALOGUE {
        let line = match bid.cost_for(item) {
            Some(cost) => format!("{item}: {} {}", cost.amount, cost.currency),
            None => format!("{item}: 0.0 USD"),
        };
        lines.push(line);
    }

    lines.push(String::new());
    lines.push(format!("Условия оплаты: {}", details.payment_terms));
    lines.push(String::new());
    lines.push("Примечания:".to_owned());
    for text in [&details.cargo_description, &details.notes] {
        lines.extend(
            text.lines().filter(|line| !line.trim().is_empty()).map(|line| format!("  {line}")),
        );
    }

    lines.join("\n")
}

pub fn request_mail(bid: &Bid, to: &str, attachments: &[PathBuf]) -> OutboundMail {
    OutboundMail {
        to: to.to_owned(),
        subject: request_subject(bid),
        body: request_body(bid),
        attachments: attachments.to_vec(),
    }
}

pub fn status_notice(offer: &Offer) -> OutboundMail {
    let status = offer.status.display_label();
    let body = format!(
        "Здравствуйте, {sender}!\n\
         Статус вашей заявки с ID {bid_id} изменён на \"{status}\".\n\
         Подробности:\n\
         - Перевозчик: {sender}\n\
         - ID заявки: {bid_id}\n\
         - Статус: {status}\n\
         С уважением,\n\
         Логистическая система\n",
        sender = offer.sender_name,
        bid_id = offer.bid_id,
    );

    OutboundMail {
        to: offer.sender_address.clone(),
        subject: format!("Обновление статуса заявки {}", offer.bid_id),
        body,
        attachments: Vec::new(),
    }
}

pub fn contract_cover(bid: &Bid, offer: &Offer, contract: PathBuf) -> OutboundMail {
    let body = format!(
        "Уважаемый {sender},\n\
         Прикрепляем договор по заявке {bid_id}.\n\
         Просим подтвердить получение и согласие с условиями.\n\
         С уважением,\n\
         Логистический отдел\n",
        sender = offer.sender_name,
        bid_id = bid.id,
    );

    OutboundMail {
        to: offer.sender_address.clone(),
        subject: format!("Договор по заявке {}", bid.id),
        body,
        attachments: vec![contract],
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::{contract_cover, request_body, request_subject, status_notice};
    use crate::domain::bid::{Bid, BidDetails, BidId, BidStatus};
    use crate::domain::catalog::{CostItem, CostLine};
    use crate::domain::offer::{Offer, OfferStatus};
    use crate::parser::OfferParser;
    use crate::ports::InboundMessage;

    fn bid() -> Bid {
        Bid {
            id: BidId::new("SHIP-20240101-1200"),
            order_number: String::new(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
            status: BidStatus::New,
            details: BidDetails {
                country_from: "Китай".to_owned(),
                port_from: "Ningbo".to_owned(),
                cargo_type: "не опасный".to_owned(),
                cargo_description: "Станки\n\nзапчасти".to_owned(),
                loading_address: "Ningbo".to_owned(),
                payment_terms: "100%".to_owned(),
                notes: "Простой оплачивается отдельно".to_owned(),
                ..BidDetails::default()
            },
            costs: vec![CostLine::new(CostItem::SeaFreight, Decimal::new(1500, 0), "USD")],
        }
    }

    #[test]
    fn request_body_lists_catalogue_and_indented_notes() {
        let body = request_body(&bid());

        assert!(body.contains("ID заявки: SHIP-20240101-1200"));
        assert!(body.contains("Номер заказа: Не указан"));
        assert!(body.contains("Sea freight: 1500 USD"));
        assert!(body.contains("Pre-carriage: 0.0 USD"));
        assert!(body.ends_with("Примечания:\n  Станки\n  запчасти\n  Простой оплачивается отдельно"));
        assert_eq!(request_subject(&bid()), "Новая заявка SHIP-20240101-1200");
    }

    #[test]
    fn filled_in_request_parses_back() {
        let reply = request_body(&bid()).replace("Pre-carriage: 0.0 USD", "Pre-carriage: 250 EUR");
        let offer = OfferParser::standard()
            .extract(&InboundMessage {
                message_ref: "r1".to_owned(),
                body: reply,
                sender_name: "Carrier".to_owned(),
                sender_address: "c@test".to_owned(),
                received_at: Utc::now(),
                subject: "RE".to_owned(),
            })
            .expect("request id round-trips");

        assert_eq!(offer.bid_id.as_str(), "SHIP-20240101-1200");
        assert_eq!(offer.costs.len(), CostItem::CATALOGUE.len());
        let pre = offer.cost_for(CostItem::PreCarriage).expect("pre-carriage");
        assert_eq!(pre.amount, Decimal::new(250, 0));
        assert_eq!(pre.currency, "EUR");
    }

    #[test]
    fn notices_address_the_offer_sender() {
        let offer = Offer {
            sender_name: "Baltic Lines".to_owned(),
            sender_address: "quotes@baltic.test".to_owned(),
            bid_id: BidId::new("SHIP-20240101-1200"),
            received_at: Utc::now(),
            subject: String::new(),
            order_number: String::new(),
            rate: None,
            conditions: None,
            costs: Vec::new(),
            status: OfferStatus::Accepted,
            last_status_change: None,
        };

        let notice = status_notice(&offer);
        assert_eq!(notice.to, "quotes@baltic.test");
        assert_eq!(notice.subject, "Обновление статуса заявки SHIP-20240101-1200");
        assert!(notice.body.contains("изменён на \"Принято\""));

        let cover = contract_cover(&bid(), &offer, PathBuf::from("/contracts/c.html"));
        assert_eq!(cover.subject, "Договор по заявке SHIP-20240101-1200");
        assert_eq!(cover.attachments, vec![PathBuf::from("/contracts/c.html")]);
    }
}
