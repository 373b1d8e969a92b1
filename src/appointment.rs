use crate::notify::{MessagePair, OutboundMessage};
use crate::sanitize;
use chrono::NaiveDate;
use std::fmt;
use std::str::FromStr;

pub const PROVIDER_SUBJECT: &str = "New Appointment Request";
pub const CONFIRMATION_SUBJECT: &str = "Appointment Request Confirmation";

pub const ALLOWED_ATTACHMENT_TYPES: [&str; 3] = ["image/jpeg", "image/png", "application/pdf"];

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum AppointmentError {
    #[error("no provider named {0:?}")]
    UnknownProvider(String),
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("no contact email configured in {0}")]
    MissingProviderEmail(&'static str),
    #[error("{field} is not a valid email address: {value:?}")]
    InvalidEmail { field: &'static str, value: String },
    #[error("preferred date must be YYYY-MM-DD, got {0:?}")]
    InvalidDate(String),
    #[error("unknown time slot {0:?}")]
    UnknownTimeSlot(String),
    #[error("attachment {filename:?} has unsupported type {content_type:?}")]
    UnsupportedAttachment {
        filename: String,
        content_type: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeSlot {
    TenAm,
    ElevenAm,
    ThreePm,
    FourPm,
    FivePm,
    SevenPm,
}

impl TimeSlot {
    pub const ALL: [TimeSlot; 6] = [
        TimeSlot::TenAm,
        TimeSlot::ElevenAm,
        TimeSlot::ThreePm,
        TimeSlot::FourPm,
        TimeSlot::FivePm,
        TimeSlot::SevenPm,
    ];

    pub fn label(self) -> &'static str {
        match self {
            TimeSlot::TenAm => "10:00 AM",
            TimeSlot::ElevenAm => "11:00 AM",
            TimeSlot::ThreePm => "3:00 PM",
            TimeSlot::FourPm => "4:00 PM",
            TimeSlot::FivePm => "5:00 PM",
            TimeSlot::SevenPm => "7:00 PM",
        }
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TimeSlot {
    type Err = AppointmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        TimeSlot::ALL
            .into_iter()
            .find(|slot| slot.label().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| AppointmentError::UnknownTimeSlot(s.to_string()))
    }
}

struct ProviderSeed {
    name: &'static str,
    specialization: &'static str,
    phone: &'static str,
    email_var: &'static str,
}

const PROVIDERS: [ProviderSeed; 3] = [
    ProviderSeed {
        name: "Dr. John Doe",
        specialization: "Neurosurgeon",
        phone: "+1 555-123-4567",
        email_var: "PROVIDER_JOHN_DOE_EMAIL",
    },
    ProviderSeed {
        name: "Dr. Jane Smith",
        specialization: "Neurologist",
        phone: "+1 555-987-6543",
        email_var: "PROVIDER_JANE_SMITH_EMAIL",
    },
    ProviderSeed {
        name: "Dr. Robert Brown",
        specialization: "Radiologist",
        phone: "+1 555-456-7890",
        email_var: "PROVIDER_ROBERT_BROWN_EMAIL",
    },
];

/// Environment variables holding each provider's contact email.
pub fn provider_email_vars() -> impl Iterator<Item = &'static str> {
    PROVIDERS.iter().map(|seed| seed.email_var)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderRecord {
    pub name: &'static str,
    pub specialization: &'static str,
    pub phone: &'static str,
    pub email: String,
}

/// The fixed set of providers that can be booked.
#[derive(Debug, Clone)]
pub struct ProviderDirectory {
    providers: Vec<ProviderRecord>,
}

impl ProviderDirectory {
    /// Pairs the built-in provider list with configured contact emails.
    pub fn from_emails(emails: &[(&'static str, String)]) -> Result<Self, AppointmentError> {
        let providers = PROVIDERS
            .iter()
            .map(|seed| {
                let email = emails
                    .iter()
                    .find(|(var, _)| *var == seed.email_var)
                    .map(|(_, email)| email.trim().to_string())
                    .ok_or(AppointmentError::MissingProviderEmail(seed.email_var))?;
                validate_email(seed.email_var, &email)?;
                Ok(ProviderRecord {
                    name: seed.name,
                    specialization: seed.specialization,
                    phone: seed.phone,
                    email,
                })
            })
            .collect::<Result<Vec<_>, AppointmentError>>()?;
        Ok(Self { providers })
    }

    pub fn all(&self) -> &[ProviderRecord] {
        &self.providers
    }

    pub fn find(&self, name: &str) -> Result<&ProviderRecord, AppointmentError> {
        self.providers
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| AppointmentError::UnknownProvider(name.to_string()))
    }
}

fn validate_email(field: &'static str, value: &str) -> Result<(), AppointmentError> {
    value
        .parse::<lettre::Address>()
        .map(|_| ())
        .map_err(|_| AppointmentError::InvalidEmail {
            field,
            value: value.to_string(),
        })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Form fields exactly as submitted.
#[derive(Debug, Clone, Default)]
pub struct AppointmentForm {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub city: String,
    pub state: String,
    pub country: String,
    pub preferred_date: String,
    pub time_slot: String,
    pub message: String,
    pub attachments: Vec<Attachment>,
}

/// A submitted form after cleaning and validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppointmentRequest {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub city: String,
    pub state: String,
    pub country: String,
    pub preferred_date: NaiveDate,
    pub time_slot: TimeSlot,
    pub message: String,
    pub attachments: Vec<Attachment>,
}

impl TryFrom<AppointmentForm> for AppointmentRequest {
    type Error = AppointmentError;

    fn try_from(form: AppointmentForm) -> Result<Self, Self::Error> {
        let name = sanitize::single_line(&form.name);
        if name.is_empty() {
            return Err(AppointmentError::MissingField("name"));
        }
        let email = sanitize::single_line(&form.email);
        if email.is_empty() {
            return Err(AppointmentError::MissingField("email"));
        }
        validate_email("email", &email)?;

        let preferred_date = NaiveDate::parse_from_str(form.preferred_date.trim(), "%Y-%m-%d")
            .map_err(|_| AppointmentError::InvalidDate(form.preferred_date.clone()))?;
        let time_slot = form.time_slot.parse()?;

        let attachments = form
            .attachments
            .into_iter()
            .enumerate()
            .map(|(index, attachment)| clean_attachment(index, attachment))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name,
            email,
            phone: sanitize::single_line(&form.phone),
            city: sanitize::single_line(&form.city),
            state: sanitize::single_line(&form.state),
            country: sanitize::single_line(&form.country),
            preferred_date,
            time_slot,
            message: sanitize::multi_line(&form.message),
            attachments,
        })
    }
}

fn clean_attachment(index: usize, attachment: Attachment) -> Result<Attachment, AppointmentError> {
    let content_type = attachment.content_type.trim().to_ascii_lowercase();
    // Only keep the last path component of whatever the client sent.
    let base = attachment
        .filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();
    let mut filename = sanitize::single_line(base);
    if filename.is_empty() {
        filename = format!("attachment-{}", index + 1);
    }
    if !ALLOWED_ATTACHMENT_TYPES.contains(&content_type.as_str()) {
        return Err(AppointmentError::UnsupportedAttachment {
            filename,
            content_type: attachment.content_type,
        });
    }
    Ok(Attachment {
        filename,
        content_type,
        data: attachment.data,
    })
}

/// Builds the provider notification and the requester confirmation.
pub fn compose(request: &AppointmentRequest, provider: &ProviderRecord) -> MessagePair {
    // Continuation lines are indented so free text cannot start a line of its own.
    let message = if request.message.is_empty() {
        "(none)".to_string()
    } else {
        request.message.replace('\n', "\n    ")
    };

    let mut provider_body = format!(
        "Appointment Request from {name} ({email}):\n\
         \n\
         Patient Details:\n\
         Name: {name}\n\
         Email: {email}\n\
         Contact: {phone}\n\
         City: {city}\n\
         State: {state}\n\
         Country: {country}\n\
         \n\
         Appointment Details:\n\
         Doctor: {doctor}\n\
         Specialization: {specialization}\n\
         Date: {date}\n\
         Time Slot: {slot}\n\
         Message: {message}\n",
        name = request.name,
        email = request.email,
        phone = request.phone,
        city = request.city,
        state = request.state,
        country = request.country,
        doctor = provider.name,
        specialization = provider.specialization,
        date = request.preferred_date,
        slot = request.time_slot,
    );
    if !request.attachments.is_empty() {
        let names: Vec<&str> = request.attachments.iter().map(|a| a.filename.as_str()).collect();
        provider_body.push_str(&format!("Attachments: {}\n", names.join(", ")));
    }
    provider_body.push_str("\nPlease reach out to confirm the appointment.\n");

    let confirmation_body = format!(
        "Dear {name},\n\
         \n\
         Your appointment request has been received. Below are the details of the doctor you selected:\n\
         \n\
         Doctor's Information:\n\
         Doctor: {doctor}\n\
         Specialization: {specialization}\n\
         Contact: {doctor_phone}\n\
         \n\
         Your Appointment Details:\n\
         Contact: {phone}\n\
         City: {city}\n\
         State: {state}\n\
         Country: {country}\n\
         Date: {date}\n\
         Time Slot: {slot}\n\
         Message: {message}\n\
         \n\
         The doctor will contact you soon to confirm the appointment.\n\
         \n\
         Thank you for using our service.\n",
        name = request.name,
        doctor = provider.name,
        specialization = provider.specialization,
        doctor_phone = provider.phone,
        phone = request.phone,
        city = request.city,
        state = request.state,
        country = request.country,
        date = request.preferred_date,
        slot = request.time_slot,
    );

    MessagePair {
        to_provider: OutboundMessage {
            to: provider.email.clone(),
            subject: PROVIDER_SUBJECT.to_string(),
            body: provider_body,
            attachments: request.attachments.clone(),
        },
        confirmation: OutboundMessage {
            to: request.email.clone(),
            subject: CONFIRMATION_SUBJECT.to_string(),
            body: confirmation_body,
            attachments: Vec::new(),
        },
    }
}
