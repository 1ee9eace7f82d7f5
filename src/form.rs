//! The consultation data-entry form and its field-level validation.
//!
//! [`ConsultationForm`] carries the raw submission exactly as typed (every
//! value is a string, the logo is an optional upload).  [`ConsultationForm::validate`]
//! either produces a cleaned [`Submission`] or a [`FormErrors`] map keyed by
//! [`Field`], in form order, so that frontends can render messages next to the
//! offending inputs.  [`validate_field`] checks a single value in isolation for
//! live validation while the user is typing.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::elements::decode_image_from_bytes;
use crate::media::detect_image_type;
use crate::record::ReportDetails;

/// Maximum length of single-line text fields.
pub const MAX_CHAR_FIELD_LEN: usize = 255;

/// Maximum length of the free-text fields.
pub const MAX_TEXT_FIELD_LEN: usize = 5000;

/// Default upper bound for logo uploads (5 MiB).
pub const DEFAULT_MAX_LOGO_BYTES: u64 = 5 * 1024 * 1024;

/// Image types accepted for the clinic logo by default.
pub const DEFAULT_LOGO_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/webp"];

const REQUIRED: &str = "This field is required.";
const INVALID_CONTACT: &str = "Please enter a valid email address or phone number.";
const INVALID_DATE: &str = "Enter a valid date.";
const LOGO_WRONG_TYPE: &str = "Please upload a valid image file (JPEG, PNG, GIF, or WebP).";
const LOGO_UNDECODABLE: &str =
    "Upload a valid image. The file you uploaded was either not an image or a corrupted image.";

const DATE_INPUT_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%m/%d/%y",
    "%b %d %Y",
    "%b %d, %Y",
    "%d %b %Y",
    "%d %b, %Y",
    "%B %d %Y",
    "%B %d, %Y",
    "%d %B %Y",
    "%d %B, %Y",
];

/// Inputs of the consultation form, in display order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    ClinicName,
    ClinicLogo,
    PhysicianName,
    PhysicianContact,
    PatientFirstName,
    PatientLastName,
    PatientDob,
    PatientContact,
    ChiefComplaint,
    ConsultationNote,
}

impl Field {
    /// All fields in display order.
    pub const ALL: [Field; 10] = [
        Field::ClinicName,
        Field::ClinicLogo,
        Field::PhysicianName,
        Field::PhysicianContact,
        Field::PatientFirstName,
        Field::PatientLastName,
        Field::PatientDob,
        Field::PatientContact,
        Field::ChiefComplaint,
        Field::ConsultationNote,
    ];

    /// Name used on the wire (form inputs, JSON keys, database columns).
    pub fn name(self) -> &'static str {
        match self {
            Field::ClinicName => "clinic_name",
            Field::ClinicLogo => "clinic_logo",
            Field::PhysicianName => "physician_name",
            Field::PhysicianContact => "physician_contact",
            Field::PatientFirstName => "patient_first_name",
            Field::PatientLastName => "patient_last_name",
            Field::PatientDob => "patient_dob",
            Field::PatientContact => "patient_contact",
            Field::ChiefComplaint => "chief_complaint",
            Field::ConsultationNote => "consultation_note",
        }
    }

    /// Human readable label.
    pub fn label(self) -> &'static str {
        match self {
            Field::ClinicName => "Clinic Name",
            Field::ClinicLogo => "Clinic Logo",
            Field::PhysicianName => "Physician Name",
            Field::PhysicianContact => "Physician Contact",
            Field::PatientFirstName => "Patient First Name",
            Field::PatientLastName => "Patient Last Name",
            Field::PatientDob => "Patient DoB",
            Field::PatientContact => "Patient Contact",
            Field::ChiefComplaint => "Chief Complaint",
            Field::ConsultationNote => "Consultation Note",
        }
    }

    /// Looks a field up by its wire name.
    pub fn from_name(name: &str) -> Option<Field> {
        Field::ALL.into_iter().find(|field| field.name() == name)
    }

    /// Whether the input is a multi-line text area.
    pub fn is_text_area(self) -> bool {
        matches!(self, Field::ChiefComplaint | Field::ConsultationNote)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An uploaded logo file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogoUpload {
    /// File name supplied by the client.
    pub filename: String,
    /// Content type declared by the client, if any.
    pub content_type: Option<String>,
    /// Raw file contents.
    pub bytes: Vec<u8>,
}

impl LogoUpload {
    /// Creates a new upload.
    pub fn new(filename: impl Into<String>, content_type: Option<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            content_type,
            bytes,
        }
    }

    /// The declared content type, falling back to sniffing the bytes.
    pub fn effective_content_type(&self) -> Option<String> {
        match self.content_type.as_deref().map(str::trim) {
            Some(declared) if !declared.is_empty() => Some(declared.to_ascii_lowercase()),
            _ => detect_image_type(&self.bytes).map(str::to_string),
        }
    }
}

/// Limits applied to logo uploads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormLimits {
    /// Largest accepted logo in bytes.
    pub max_logo_bytes: u64,
    /// Accepted logo content types.
    pub allowed_logo_types: Vec<String>,
}

impl Default for FormLimits {
    fn default() -> Self {
        Self {
            max_logo_bytes: DEFAULT_MAX_LOGO_BYTES,
            allowed_logo_types: DEFAULT_LOGO_TYPES.iter().map(|t| t.to_string()).collect(),
        }
    }
}

/// The raw consultation form submission.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsultationForm {
    pub clinic_name: String,
    pub physician_name: String,
    pub physician_contact: String,
    pub patient_first_name: String,
    pub patient_last_name: String,
    pub patient_dob: String,
    pub patient_contact: String,
    pub chief_complaint: String,
    pub consultation_note: String,
    #[serde(skip)]
    pub clinic_logo: Option<LogoUpload>,
}

/// A validated submission ready to be persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Submission {
    /// Cleaned field values.
    pub details: ReportDetails,
    /// The logo, if one was uploaded.
    pub logo: Option<LogoUpload>,
}

impl ConsultationForm {
    /// Returns the raw text value of a field; the logo field reports its file name.
    pub fn value(&self, field: Field) -> &str {
        match field {
            Field::ClinicName => &self.clinic_name,
            Field::ClinicLogo => self
                .clinic_logo
                .as_ref()
                .map(|logo| logo.filename.as_str())
                .unwrap_or(""),
            Field::PhysicianName => &self.physician_name,
            Field::PhysicianContact => &self.physician_contact,
            Field::PatientFirstName => &self.patient_first_name,
            Field::PatientLastName => &self.patient_last_name,
            Field::PatientDob => &self.patient_dob,
            Field::PatientContact => &self.patient_contact,
            Field::ChiefComplaint => &self.chief_complaint,
            Field::ConsultationNote => &self.consultation_note,
        }
    }

    /// Sets a text field by wire name. Returns `false` for unknown names and the logo.
    pub fn set_value(&mut self, name: &str, value: impl Into<String>) -> bool {
        let slot = match Field::from_name(name) {
            Some(Field::ClinicName) => &mut self.clinic_name,
            Some(Field::PhysicianName) => &mut self.physician_name,
            Some(Field::PhysicianContact) => &mut self.physician_contact,
            Some(Field::PatientFirstName) => &mut self.patient_first_name,
            Some(Field::PatientLastName) => &mut self.patient_last_name,
            Some(Field::PatientDob) => &mut self.patient_dob,
            Some(Field::PatientContact) => &mut self.patient_contact,
            Some(Field::ChiefComplaint) => &mut self.chief_complaint,
            Some(Field::ConsultationNote) => &mut self.consultation_note,
            Some(Field::ClinicLogo) | None => return false,
        };
        *slot = value.into();
        true
    }

    /// Validates the form with the default limits.
    pub fn validate(&self) -> Result<Submission, FormErrors> {
        self.validate_with(&FormLimits::default())
    }

    /// Validates every field and returns the cleaned submission or all errors found.
    pub fn validate_with(&self, limits: &FormLimits) -> Result<Submission, FormErrors> {
        let mut errors = FormErrors::default();

        let mut text = |field: Field| match clean_text(field, self.value(field)) {
            Ok(value) => value,
            Err(message) => {
                errors.add(field, message);
                String::new()
            }
        };

        let clinic_name = text(Field::ClinicName);
        let physician_name = text(Field::PhysicianName);
        let physician_contact = text(Field::PhysicianContact);
        let patient_first_name = text(Field::PatientFirstName);
        let patient_last_name = text(Field::PatientLastName);
        let patient_contact = text(Field::PatientContact);
        let chief_complaint = text(Field::ChiefComplaint);
        let consultation_note = text(Field::ConsultationNote);

        let patient_dob = match clean_date(&self.patient_dob) {
            Ok(date) => Some(date),
            Err(message) => {
                errors.add(Field::PatientDob, message);
                None
            }
        };

        if let Some(logo) = &self.clinic_logo {
            if let Err(message) = clean_logo(logo, limits) {
                errors.add(Field::ClinicLogo, message);
            }
        }

        match patient_dob {
            Some(patient_dob) if errors.is_empty() => Ok(Submission {
                details: ReportDetails {
                    clinic_name,
                    physician_name,
                    physician_contact,
                    patient_first_name,
                    patient_last_name,
                    patient_dob,
                    patient_contact,
                    chief_complaint,
                    consultation_note,
                },
                logo: self.clinic_logo.clone(),
            }),
            _ => Err(errors),
        }
    }
}

/// Validates one text value in isolation and returns its error messages.
///
/// The logo cannot be checked from a text value, so it always validates.
pub fn validate_field(field: Field, value: &str) -> Vec<String> {
    let result = match field {
        Field::ClinicLogo => Ok(()),
        Field::PatientDob => clean_date(value).map(|_| ()),
        _ => clean_text(field, value).map(|_| ()),
    };
    result.err().into_iter().collect()
}

fn clean_text(field: Field, raw: &str) -> Result<String, String> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(REQUIRED.to_string());
    }

    let length = value.chars().count();
    if field.is_text_area() {
        if length > MAX_TEXT_FIELD_LEN {
            return Err(format!(
                "{} cannot exceed {} characters.",
                sentence_case(field.label()),
                MAX_TEXT_FIELD_LEN
            ));
        }
    } else if length > MAX_CHAR_FIELD_LEN {
        return Err(format!(
            "Ensure this value has at most {} characters (it has {}).",
            MAX_CHAR_FIELD_LEN, length
        ));
    }

    if matches!(field, Field::PhysicianContact | Field::PatientContact) && !is_valid_contact(value)
    {
        return Err(INVALID_CONTACT.to_string());
    }

    Ok(value.to_string())
}

fn sentence_case(label: &str) -> String {
    let mut words = label.split(' ');
    let mut result = words.next().unwrap_or_default().to_string();
    for word in words {
        result.push(' ');
        result.push_str(&word.to_lowercase());
    }
    result
}

fn clean_date(raw: &str) -> Result<NaiveDate, String> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(REQUIRED.to_string());
    }
    parse_date(value).ok_or_else(|| INVALID_DATE.to_string())
}

/// Parses a date in any of the accepted input formats.
///
/// A four-digit year is required wherever the format has `%Y`, so `10/25/06`
/// reads as 2006 through `%y` rather than as year 6.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    DATE_INPUT_FORMATS
        .iter()
        .filter(|format| has_four_digit_year(value, format))
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
}

fn has_four_digit_year(value: &str, format: &str) -> bool {
    if !format.contains("%Y") {
        return true;
    }
    let mut runs = value
        .split(|c: char| !c.is_ascii_digit())
        .filter(|run| !run.is_empty());
    let year = if format.starts_with("%Y") {
        runs.next()
    } else {
        runs.last()
    };
    year.is_some_and(|run| run.len() == 4)
}

fn logo_too_large(max_bytes: u64) -> String {
    const MIB: u64 = 1024 * 1024;
    const KIB: u64 = 1024;
    let limit = if max_bytes % MIB == 0 {
        format!("{}MB", max_bytes / MIB)
    } else if max_bytes % KIB == 0 {
        format!("{}KB", max_bytes / KIB)
    } else {
        format!("{max_bytes} bytes")
    };
    format!("File size cannot exceed {limit}.")
}

fn clean_logo(logo: &LogoUpload, limits: &FormLimits) -> Result<(), String> {
    if logo.bytes.len() as u64 > limits.max_logo_bytes {
        return Err(logo_too_large(limits.max_logo_bytes));
    }

    let accepted = logo.effective_content_type().is_some_and(|content_type| {
        limits
            .allowed_logo_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(&content_type))
    });
    if !accepted {
        return Err(LOGO_WRONG_TYPE.to_string());
    }

    decode_image_from_bytes(&logo.bytes).map_err(|_| LOGO_UNDECODABLE.to_string())?;
    Ok(())
}

/// Whether `contact` is a valid e-mail address or phone number.
pub fn is_valid_contact(contact: &str) -> bool {
    is_valid_email(contact) || is_valid_phone(contact)
}

fn email_user_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^[-!#$%&'*+/=?^_`{}|~0-9a-z]+(\.[-!#$%&'*+/=?^_`{}|~0-9a-z]+)*$")
            .expect("valid e-mail user pattern")
    })
}

fn email_domain_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z0-9-]{2,63}$")
            .expect("valid e-mail domain pattern")
    })
}

fn phone_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\+?[1-9]\d{0,15}$|^[\d\s\-()]{10,}$").expect("valid phone pattern")
    })
}

/// Whether `value` is a syntactically valid e-mail address.
pub fn is_valid_email(value: &str) -> bool {
    if value.len() > 320 {
        return false;
    }
    let Some((user, domain)) = value.rsplit_once('@') else {
        return false;
    };
    if !email_user_regex().is_match(user) {
        return false;
    }
    if domain.eq_ignore_ascii_case("localhost") {
        return true;
    }
    if let Some(literal) = domain
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
    {
        let literal = literal.strip_prefix("IPv6:").unwrap_or(literal);
        return literal.parse::<std::net::IpAddr>().is_ok();
    }
    let top_level = domain.rsplit('.').next().unwrap_or_default();
    email_domain_regex().is_match(domain) && !top_level.ends_with('-')
}

/// Whether `value` looks like a phone number once separators are removed.
pub fn is_valid_phone(value: &str) -> bool {
    let digits: String = value
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
        .collect();
    phone_regex().is_match(&digits)
}

/// Validation messages keyed by field, in form order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FormErrors {
    errors: BTreeMap<Field, Vec<String>>,
}

/// A single flattened validation message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// The offending field.
    pub field: Field,
    /// The message.
    pub message: String,
}

impl FormErrors {
    /// Records a message for `field`.
    pub fn add(&mut self, field: Field, message: impl Into<String>) {
        self.errors.entry(field).or_default().push(message.into());
    }

    /// Whether no errors were recorded.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of fields with errors.
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Messages recorded for `field`.
    pub fn get(&self, field: Field) -> &[String] {
        self.errors.get(&field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Iterates over fields with errors in form order.
    pub fn iter(&self) -> impl Iterator<Item = (Field, &[String])> {
        self.errors
            .iter()
            .map(|(field, messages)| (*field, messages.as_slice()))
    }

    /// Flattens the map into `(field, message)` pairs.
    pub fn flatten(&self) -> Vec<FieldError> {
        self.iter()
            .flat_map(|(field, messages)| {
                messages.iter().map(move |message| FieldError {
                    field,
                    message: message.clone(),
                })
            })
            .collect()
    }
}

impl fmt::Display for FormErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for error in self.flatten() {
            if !first {
                f.write_str("; ")?;
            }
            first = false;
            write!(f, "{}: {}", error.field, error.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for FormErrors {}

#[cfg(test)]
pub(crate) fn sample_form() -> ConsultationForm {
    ConsultationForm {
        clinic_name: "Harbour View Clinic".to_string(),
        physician_name: "Dr. Amara Okafor".to_string(),
        physician_contact: "a.okafor@harbourview.example".to_string(),
        patient_first_name: "Jonas".to_string(),
        patient_last_name: "Lindqvist".to_string(),
        patient_dob: "1984-03-09".to_string(),
        patient_contact: "+46 70 123 45 67".to_string(),
        chief_complaint: "Persistent dry cough for three weeks.".to_string(),
        consultation_note: "Chest clear on auscultation.".to_string(),
        clinic_logo: None,
    }
}
