//! Certificate records, the only transaction shape the ledger carries.

use crate::hash::{hash, Hash};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Errors raised when a certificate is not fit for the pending pool.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CertificateError {
    #[error("certificate field `{0}` must not be empty")]
    EmptyField(&'static str),
}

/// A student certificate.
///
/// Field order is part of the canonical encoding: bincode writes fields in
/// declaration order, so reordering them changes every hash on the chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Certificate {
    /// Opaque student identifier.
    pub student_id: String,
    /// Student's name as printed on the certificate.
    pub name: String,
    /// Course the certificate is issued for.
    pub course: String,
    /// Grade awarded.
    pub grade: String,
    /// Unix timestamp in seconds.
    pub issued_at: u64,
}

impl Certificate {
    /// Create a certificate with an explicit issue time.
    pub fn new(
        student_id: impl Into<String>,
        name: impl Into<String>,
        course: impl Into<String>,
        grade: impl Into<String>,
        issued_at: u64,
    ) -> Self {
        Self {
            student_id: student_id.into(),
            name: name.into(),
            course: course.into(),
            grade: grade.into(),
            issued_at,
        }
    }

    /// Create a certificate issued now.
    pub fn issue(
        student_id: impl Into<String>,
        name: impl Into<String>,
        course: impl Into<String>,
        grade: impl Into<String>,
    ) -> Self {
        Self::new(student_id, name, course, grade, unix_now())
    }

    /// Canonical byte encoding fed to the hash function.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        bincode::serialize(self).expect("serialization should not fail")
    }

    /// The leaf hash of this certificate.
    pub fn hash(&self) -> Hash {
        hash(&self.canonical_bytes())
    }

    /// Whether this certificate is for the given student and course.
    pub fn matches(&self, student_id: &str, course: &str) -> bool {
        self.student_id == student_id && self.course == course
    }

    /// Reject certificates missing the fields used to look them up.
    pub fn validate(&self) -> Result<(), CertificateError> {
        if self.student_id.trim().is_empty() {
            return Err(CertificateError::EmptyField("student_id"));
        }
        if self.course.trim().is_empty() {
            return Err(CertificateError::EmptyField("course"));
        }
        Ok(())
    }
}

/// Current Unix timestamp in seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
