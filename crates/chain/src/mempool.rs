//! Pending certificate pool.
//!
//! The pool keeps certificates in arrival order; that order becomes the
//! merkle leaf order of the next block.

use certchain_core::{Certificate, CertificateError, Hash};
use std::collections::HashSet;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur during mempool operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MempoolError {
    #[error("a certificate for student {student_id} in course {course} is already pending")]
    DuplicateCertificate { student_id: String, course: String },

    #[error("mempool is full (capacity: {0})")]
    MempoolFull(usize),

    #[error("invalid certificate: {0}")]
    InvalidCertificate(#[from] CertificateError),
}

pub type Result<T> = std::result::Result<T, MempoolError>;

/// Configuration for the mempool.
#[derive(Debug, Clone)]
pub struct MempoolConfig {
    /// Maximum number of pending certificates.
    pub max_pending: usize,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            max_pending: 10_000,
        }
    }
}

/// Pending certificate pool.
#[derive(Debug, Clone)]
pub struct Mempool {
    /// Configuration.
    config: MempoolConfig,
    /// Certificates in arrival order.
    pending: Vec<Certificate>,
    /// `(student_id, course)` keys of pending certificates.
    keys: HashSet<(String, String)>,
}

impl Default for Mempool {
    fn default() -> Self {
        Self::new()
    }
}

impl Mempool {
    /// Create a new mempool with default configuration.
    pub fn new() -> Self {
        Self::with_config(MempoolConfig::default())
    }

    /// Create a new mempool with the given configuration.
    pub fn with_config(config: MempoolConfig) -> Self {
        Self {
            config,
            pending: Vec::new(),
            keys: HashSet::new(),
        }
    }

    /// Restore a pool from previously persisted certificates, skipping
    /// duplicates.
    pub fn restore(config: MempoolConfig, certificates: Vec<Certificate>) -> Self {
        let mut pool = Self::with_config(config);
        for cert in certificates {
            if let Err(e) = pool.add(cert) {
                debug!(error = %e, "dropping persisted pending certificate");
            }
        }
        pool
    }

    /// Get the number of pending certificates.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Check if the mempool is empty.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Check if a certificate for this student and course is pending.
    pub fn contains(&self, student_id: &str, course: &str) -> bool {
        self.keys
            .contains(&(student_id.to_string(), course.to_string()))
    }

    /// Add a certificate to the pool.
    pub fn add(&mut self, cert: Certificate) -> Result<()> {
        cert.validate()?;

        if self.contains(&cert.student_id, &cert.course) {
            return Err(MempoolError::DuplicateCertificate {
                student_id: cert.student_id,
                course: cert.course,
            });
        }

        if self.pending.len() >= self.config.max_pending {
            return Err(MempoolError::MempoolFull(self.config.max_pending));
        }

        debug!(student_id = %cert.student_id, course = %cert.course, "certificate queued");
        self.keys
            .insert((cert.student_id.clone(), cert.course.clone()));
        self.pending.push(cert);

        Ok(())
    }

    /// Stable ordered snapshot of up to `limit` certificates, oldest first.
    pub fn snapshot(&self, limit: usize) -> Vec<Certificate> {
        self.pending.iter().take(limit).cloned().collect()
    }

    /// All pending certificates, oldest first.
    pub fn pending(&self) -> &[Certificate] {
        &self.pending
    }

    /// Remove certificates that made it into a block.
    pub fn remove_included(&mut self, included: &[Certificate]) {
        let sealed: HashSet<Hash> = included.iter().map(Certificate::hash).collect();
        self.pending.retain(|cert| !sealed.contains(&cert.hash()));
        self.keys = self
            .pending
            .iter()
            .map(|c| (c.student_id.clone(), c.course.clone()))
            .collect();
    }

    /// Get mempool statistics.
    pub fn stats(&self) -> MempoolStats {
        MempoolStats {
            pending: self.pending.len(),
            capacity: self.config.max_pending,
        }
    }
}

/// Mempool statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MempoolStats {
    pub pending: usize,
    pub capacity: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cert(id: &str, course: &str) -> Certificate {
        Certificate::new(id, "Name", course, "A", 1)
    }

    #[test]
    fn test_add_and_snapshot_preserve_order() {
        let mut pool = Mempool::new();
        pool.add(cert("3", "Math")).unwrap();
        pool.add(cert("1", "Math")).unwrap();
        pool.add(cert("2", "Math")).unwrap();

        let ids: Vec<_> = pool
            .snapshot(10)
            .into_iter()
            .map(|c| c.student_id)
            .collect();
        assert_eq!(ids, ["3", "1", "2"]);
        assert_eq!(pool.snapshot(2).len(), 2);
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut pool = Mempool::new();
        pool.add(cert("1", "Math")).unwrap();

        let mut again = cert("1", "Math");
        again.grade = "B".into();
        assert_eq!(
            pool.add(again),
            Err(MempoolError::DuplicateCertificate {
                student_id: "1".into(),
                course: "Math".into()
            })
        );

        // Same student, other course is fine.
        pool.add(cert("1", "Physics")).unwrap();
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_capacity() {
        let mut pool = Mempool::with_config(MempoolConfig { max_pending: 1 });
        pool.add(cert("1", "Math")).unwrap();
        assert_eq!(pool.add(cert("2", "Math")), Err(MempoolError::MempoolFull(1)));
    }

    #[test]
    fn test_invalid_certificate_rejected() {
        let mut pool = Mempool::new();
        assert!(matches!(
            pool.add(cert("", "Math")),
            Err(MempoolError::InvalidCertificate(_))
        ));
        assert!(pool.is_empty());
    }

    #[test]
    fn test_remove_included() {
        let mut pool = Mempool::new();
        pool.add(cert("1", "Math")).unwrap();
        pool.add(cert("2", "Math")).unwrap();
        pool.add(cert("3", "Math")).unwrap();

        let sealed = pool.snapshot(2);
        pool.remove_included(&sealed);

        assert_eq!(pool.len(), 1);
        assert!(!pool.contains("1", "Math"));
        assert!(pool.contains("3", "Math"));
        // Key freed, so the student can be queued again.
        pool.add(cert("1", "Math")).unwrap();
    }

    #[test]
    fn test_restore_skips_duplicates() {
        let pool = Mempool::restore(
            MempoolConfig::default(),
            vec![cert("1", "Math"), cert("1", "Math"), cert("2", "Math")],
        );
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_stats() {
        let mut pool = Mempool::new();
        pool.add(cert("1", "Math")).unwrap();
        assert_eq!(
            pool.stats(),
            MempoolStats {
                pending: 1,
                capacity: 10_000
            }
        );
    }
}
