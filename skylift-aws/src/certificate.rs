//! Viewer and listener certificates
//!
//! Certificates are looked up, never created. CloudFront only accepts
//! certificates from `us-east-1`; the load balancer needs one from the
//! primary region.

use skylift_core::lookup::{
    CertificateQuery, CertificateRegistry, CertificateSummary, LookupError, find_certificate,
};

use crate::config::SiteConfig;

/// Region of CloudFront certificates and edge functions
pub const EDGE_REGION: &str = "us-east-1";

#[derive(Debug, Clone, PartialEq)]
pub struct Certificates {
    /// Distribution viewer certificate (edge region)
    pub cdn: CertificateSummary,
    /// Load balancer listener certificate (primary region)
    pub api: CertificateSummary,
}

pub async fn lookup_certificates(
    registry: &dyn CertificateRegistry,
    config: &SiteConfig,
) -> Result<Certificates, LookupError> {
    let query = CertificateQuery::amazon_issued(&config.domain);
    let cdn = find_certificate(registry, EDGE_REGION, &query).await?;
    let api = if config.region == EDGE_REGION {
        cdn.clone()
    } else {
        find_certificate(registry, &config.region, &query).await?
    };
    Ok(Certificates { cdn, api })
}
