//! Lead payloads and the normalization applied before persistence.

use {
    chrono::NaiveDate,
    serde::{Deserialize, Serialize},
    thiserror::Error,
};

/// Raw lead data exactly as the model submits it through the
/// `register_lead` tool. Serde names mirror the tool schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LeadSubmission {
    pub name: String,
    pub cpf: String,
    pub phone: String,
    pub model_of_interest: String,
    pub birth_date: String,
    #[serde(rename = "hasCNH")]
    pub has_cnh: bool,
}

/// A validated, normalized lead ready for persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lead {
    pub name: String,
    /// `XXX.XXX.XXX-XX`.
    pub cpf: String,
    /// `(XX) XXXXX-XXXX`, or `(XX) XXXX-XXXX` for landlines.
    pub phone: String,
    pub model_of_interest: String,
    /// `DD/MM/YYYY`.
    pub birth_date: String,
    pub has_cnh: bool,
}

/// Why a submission was rejected. The message doubles as the log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LeadError {
    #[error("name must be letters and spaces")]
    Name,
    #[error("CPF must carry 11 digits")]
    CpfLength,
    #[error("CPF digits are all identical")]
    CpfRepeated,
    #[error("phone must carry 10 or 11 digits")]
    Phone,
    #[error("birth date must be a valid DD/MM/YYYY date")]
    BirthDate,
    #[error("model of interest is required")]
    Model,
}

impl LeadSubmission {
    /// Normalize and validate every field, producing the formatting the
    /// sales team expects downstream.
    pub fn validate(&self) -> Result<Lead, LeadError> {
        let name = self.name.trim();
        if name.is_empty() || !name.chars().all(|c| c.is_alphabetic() || c.is_whitespace()) {
            return Err(LeadError::Name);
        }

        let cpf = format_cpf(&self.cpf)?;
        let phone = format_phone(&self.phone)?;

        let model = self.model_of_interest.trim();
        if model.is_empty() {
            return Err(LeadError::Model);
        }

        let birth_date = self.birth_date.trim();
        if NaiveDate::parse_from_str(birth_date, "%d/%m/%Y").is_err() {
            return Err(LeadError::BirthDate);
        }

        Ok(Lead {
            name: name.to_string(),
            cpf,
            phone,
            model_of_interest: model.to_string(),
            birth_date: birth_date.to_string(),
            has_cnh: self.has_cnh,
        })
    }
}

fn digits(value: &str) -> String {
    value.chars().filter(char::is_ascii_digit).collect()
}

/// `XXX.XXX.XXX-XX` from any spelling carrying 11 digits.
fn format_cpf(raw: &str) -> Result<String, LeadError> {
    let d = digits(raw);
    if d.len() != 11 {
        return Err(LeadError::CpfLength);
    }
    let first = d.chars().next();
    if d.chars().all(|c| Some(c) == first) {
        return Err(LeadError::CpfRepeated);
    }
    Ok(format!("{}.{}.{}-{}", &d[..3], &d[3..6], &d[6..9], &d[9..]))
}

/// `(XX) XXXXX-XXXX` for 11 digits, `(XX) XXXX-XXXX` for 10.
fn format_phone(raw: &str) -> Result<String, LeadError> {
    let d = digits(raw);
    match d.len() {
        11 => Ok(format!("({}) {}-{}", &d[..2], &d[2..7], &d[7..])),
        10 => Ok(format!("({}) {}-{}", &d[..2], &d[2..6], &d[6..])),
        _ => Err(LeadError::Phone),
    }
}
