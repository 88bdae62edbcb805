//! Issued certificate store

use std::sync::Arc;

use dashmap::DashMap;
use shared_protocol::Certificate;

/// Certificates issued by the authority, keyed by subject.
///
/// Cloning shares the underlying map.
#[derive(Debug, Clone, Default)]
pub struct CertificateStore {
    inner: Arc<DashMap<String, Certificate>>,
}

impl CertificateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `certificate` under its subject, replacing any earlier one
    pub fn insert(&self, certificate: Certificate) -> Option<Certificate> {
        self.inner
            .insert(certificate.subject().to_string(), certificate)
    }

    pub fn get(&self, subject: &str) -> Option<Certificate> {
        self.inner.get(subject).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn subjects(&self) -> Vec<String> {
        let mut subjects: Vec<String> =
            self.inner.iter().map(|entry| entry.key().clone()).collect();
        subjects.sort();
        subjects
    }
}
