//! Lookup - Read-only queries against existing infrastructure
//!
//! Certificates and hosted zones are not created by a composition; they are
//! looked up while composing. A failed lookup is fatal: there is nothing
//! meaningful to provision without a viewer certificate or a zone.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::info;
use thiserror::Error;

/// Certificate type for certificates issued by ACM itself
pub const AMAZON_ISSUED: &str = "AMAZON_ISSUED";

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("No {types} certificate found for '{domain}' in {region}")]
    NoCertificate {
        domain: String,
        region: String,
        types: String,
    },

    #[error("No hosted zone found for '{0}'")]
    NoHostedZone(String),

    #[error("Lookup failed: {0}")]
    Api(String),
}

/// Summary of a certificate in the registry
#[derive(Debug, Clone, PartialEq)]
pub struct CertificateSummary {
    pub arn: String,
    pub domain_name: String,
    pub certificate_type: String,
    pub issued_at: Option<DateTime<Utc>>,
}

/// Certificate selection criteria
#[derive(Debug, Clone, PartialEq)]
pub struct CertificateQuery {
    pub domain: String,
    pub types: Vec<String>,
}

impl CertificateQuery {
    /// Most recent ACM-issued certificate for `domain`
    pub fn amazon_issued(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            types: vec![AMAZON_ISSUED.to_string()],
        }
    }

    fn accepts(&self, cert: &CertificateSummary) -> bool {
        cert.domain_name.eq_ignore_ascii_case(&self.domain)
            && (self.types.is_empty() || self.types.iter().any(|t| t == &cert.certificate_type))
    }
}

/// Source of issued certificates for a region
#[async_trait]
pub trait CertificateRegistry: Send + Sync {
    async fn list_certificates(&self, region: &str) -> Result<Vec<CertificateSummary>, LookupError>;
}

/// Pick the most recently issued certificate that satisfies the query
pub fn select_certificate(
    candidates: Vec<CertificateSummary>,
    query: &CertificateQuery,
) -> Option<CertificateSummary> {
    candidates
        .into_iter()
        .filter(|c| query.accepts(c))
        .max_by_key(|c| c.issued_at)
}

/// Look up the certificate for `query` in `region`
pub async fn find_certificate(
    registry: &dyn CertificateRegistry,
    region: &str,
    query: &CertificateQuery,
) -> Result<CertificateSummary, LookupError> {
    let candidates = registry.list_certificates(region).await?;
    let cert = select_certificate(candidates, query).ok_or_else(|| LookupError::NoCertificate {
        domain: query.domain.clone(),
        region: region.to_string(),
        types: query.types.join("|"),
    })?;
    info!("Using certificate {} for {} ({})", cert.arn, query.domain, region);
    Ok(cert)
}

/// Route53 hosted zone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostedZone {
    /// Zone id without the "/hostedzone/" prefix
    pub id: String,
    /// Zone name, usually with a trailing dot
    pub name: String,
    pub private: bool,
}

/// Source of hosted zones
#[async_trait]
pub trait ZoneRegistry: Send + Sync {
    /// Zones whose name sorts at or after `domain`; may include unrelated zones
    async fn zones_by_name(&self, domain: &str) -> Result<Vec<HostedZone>, LookupError>;
}

fn normalize_zone_name(name: &str) -> String {
    name.trim_end_matches('.').to_ascii_lowercase()
}

/// Resolve the public hosted zone for `domain`
pub async fn find_zone(registry: &dyn ZoneRegistry, domain: &str) -> Result<HostedZone, LookupError> {
    let wanted = normalize_zone_name(domain);
    let zones = registry.zones_by_name(domain).await?;
    let zone = zones
        .into_iter()
        .filter(|z| normalize_zone_name(&z.name) == wanted)
        .min_by_key(|z| z.private)
        .ok_or_else(|| LookupError::NoHostedZone(domain.to_string()))?;
    info!("Using hosted zone {} for {}", zone.id, domain);
    Ok(zone)
}

/// Fixed certificate list, used offline and in tests
#[derive(Debug, Clone, Default)]
pub struct StaticCertificates {
    certificates: Vec<CertificateSummary>,
}

impl StaticCertificates {
    pub fn new(certificates: Vec<CertificateSummary>) -> Self {
        Self { certificates }
    }

    /// A single certificate reported for every region
    pub fn single(arn: impl Into<String>, domain: impl Into<String>) -> Self {
        Self::new(vec![CertificateSummary {
            arn: arn.into(),
            domain_name: domain.into(),
            certificate_type: AMAZON_ISSUED.to_string(),
            issued_at: None,
        }])
    }
}

#[async_trait]
impl CertificateRegistry for StaticCertificates {
    async fn list_certificates(&self, _region: &str) -> Result<Vec<CertificateSummary>, LookupError> {
        Ok(self.certificates.clone())
    }
}

/// Fixed zone list, used offline and in tests
#[derive(Debug, Clone, Default)]
pub struct StaticZones {
    zones: Vec<HostedZone>,
}

impl StaticZones {
    pub fn new(zones: Vec<HostedZone>) -> Self {
        Self { zones }
    }
}

#[async_trait]
impl ZoneRegistry for StaticZones {
    async fn zones_by_name(&self, _domain: &str) -> Result<Vec<HostedZone>, LookupError> {
        Ok(self.zones.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn cert(arn: &str, domain: &str, kind: &str, day: Option<u32>) -> CertificateSummary {
        CertificateSummary {
            arn: arn.to_string(),
            domain_name: domain.to_string(),
            certificate_type: kind.to_string(),
            issued_at: day.map(|d| Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()),
        }
    }

    #[tokio::test]
    async fn picks_most_recent_amazon_issued() {
        let registry = StaticCertificates::new(vec![
            cert("arn:old", "example.com", AMAZON_ISSUED, Some(1)),
            cert("arn:imported", "example.com", "IMPORTED", Some(20)),
            cert("arn:new", "example.com", AMAZON_ISSUED, Some(10)),
            cert("arn:other", "other.com", AMAZON_ISSUED, Some(28)),
        ]);

        let found = find_certificate(
            &registry,
            "us-east-1",
            &CertificateQuery::amazon_issued("example.com"),
        )
        .await
        .unwrap();
        assert_eq!(found.arn, "arn:new");
    }

    #[tokio::test]
    async fn missing_certificate_is_fatal() {
        let registry = StaticCertificates::new(vec![cert(
            "arn:imported",
            "example.com",
            "IMPORTED",
            Some(1),
        )]);

        let err = find_certificate(
            &registry,
            "us-east-1",
            &CertificateQuery::amazon_issued("example.com"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, LookupError::NoCertificate { .. }));
        assert!(err.to_string().contains("example.com"));
    }

    #[tokio::test]
    async fn zone_match_ignores_trailing_dot_and_prefers_public() {
        let registry = StaticZones::new(vec![
            HostedZone {
                id: "ZPRIVATE".to_string(),
                name: "example.com.".to_string(),
                private: true,
            },
            HostedZone {
                id: "ZPUBLIC".to_string(),
                name: "example.com.".to_string(),
                private: false,
            },
            HostedZone {
                id: "ZSUB".to_string(),
                name: "sub.example.com.".to_string(),
                private: false,
            },
        ]);

        let zone = find_zone(&registry, "example.com").await.unwrap();
        assert_eq!(zone.id, "ZPUBLIC");
    }

    #[tokio::test]
    async fn missing_zone_is_fatal() {
        let registry = StaticZones::new(vec![HostedZone {
            id: "ZOTHER".to_string(),
            name: "example.org.".to_string(),
            private: false,
        }]);

        let err = find_zone(&registry, "example.com").await.unwrap_err();
        assert!(matches!(err, LookupError::NoHostedZone(ref d) if d == "example.com"));
    }
}
