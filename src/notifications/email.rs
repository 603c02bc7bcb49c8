use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Emails sent after a reservation is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReservationEmail {
    /// Sent to the customer who placed the reservation.
    Confirmation {
        to: String,
        transaction_key: String,
        pick_up_date: NaiveDate,
    },
    /// Sent to the shop's staff address.
    StaffAlert {
        to: String,
        transaction_key: String,
        name: String,
        pick_up_date: NaiveDate,
        contact_number: String,
        email: String,
    },
}

impl ReservationEmail {
    pub fn recipient(&self) -> &str {
        match self {
            Self::Confirmation { to, .. } | Self::StaffAlert { to, .. } => to,
        }
    }

    pub fn transaction_key(&self) -> &str {
        match self {
            Self::Confirmation {
                transaction_key, ..
            }
            | Self::StaffAlert {
                transaction_key, ..
            } => transaction_key,
        }
    }

    /// Short label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Confirmation { .. } => "confirmation",
            Self::StaffAlert { .. } => "staff_alert",
        }
    }

    pub fn subject(&self) -> String {
        match self {
            Self::Confirmation {
                transaction_key, ..
            } => format!("Reservation Confirmation - {}", transaction_key),
            Self::StaffAlert {
                transaction_key, ..
            } => format!("New Reservation - {}", transaction_key),
        }
    }

    /// Plain-text body.
    pub fn body(&self) -> String {
        match self {
            Self::Confirmation {
                transaction_key,
                pick_up_date,
                ..
            } => format!(
                "Thank you for your reservation!\n\n\
                 Transaction key: {transaction_key}\n\
                 Pick-up date: {date}\n\n\
                 Keep your transaction key to check the status of your order.\n",
                date = pick_up_date.format("%B %-d, %Y"),
            ),
            Self::StaffAlert {
                transaction_key,
                name,
                pick_up_date,
                contact_number,
                email,
                ..
            } => format!(
                "A new reservation has been placed.\n\n\
                 Transaction key: {transaction_key}\n\
                 Name: {name}\n\
                 Pick-up date: {date}\n\
                 Contact number: {contact_number}\n\
                 Email: {email}\n",
                date = pick_up_date.format("%B %-d, %Y"),
            ),
        }
    }
}
