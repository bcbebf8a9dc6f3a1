//! AWS-backed certificate and hosted zone registries

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_acm::types::{CertificateStatus, CertificateSummary as AcmSummary};
use aws_sdk_route53::types::HostedZone as Route53Zone;
use chrono::{DateTime, Utc};
use log::debug;
use skylift_core::lookup::{
    CertificateRegistry, CertificateSummary, HostedZone, LookupError, ZoneRegistry,
};

/// Route53 is a global service served from this region
const ROUTE53_REGION: &str = "us-east-1";

const HOSTED_ZONE_PREFIX: &str = "/hostedzone/";

/// Load shared SDK configuration (credentials, profile) for `region`
pub async fn load_sdk_config(region: &str) -> SdkConfig {
    aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_string()))
        .load()
        .await
}

/// ACM certificates, queried per region
pub struct AcmRegistry {
    config: SdkConfig,
}

impl AcmRegistry {
    pub fn new(config: SdkConfig) -> Self {
        Self { config }
    }

    fn client(&self, region: &str) -> aws_sdk_acm::Client {
        let conf = aws_sdk_acm::config::Builder::from(&self.config)
            .region(Region::new(region.to_string()))
            .build();
        aws_sdk_acm::Client::from_conf(conf)
    }
}

fn issued_at(summary: &AcmSummary) -> Option<DateTime<Utc>> {
    let at = summary.issued_at()?;
    DateTime::from_timestamp(at.secs(), at.subsec_nanos())
}

fn certificate_from(summary: &AcmSummary) -> Option<CertificateSummary> {
    Some(CertificateSummary {
        arn: summary.certificate_arn()?.to_string(),
        domain_name: summary.domain_name()?.to_string(),
        certificate_type: summary
            .r#type()
            .map(|t| t.as_str().to_string())
            .unwrap_or_default(),
        issued_at: issued_at(summary),
    })
}

#[async_trait]
impl CertificateRegistry for AcmRegistry {
    async fn list_certificates(&self, region: &str) -> Result<Vec<CertificateSummary>, LookupError> {
        let client = self.client(region);
        let mut pages = client
            .list_certificates()
            .certificate_statuses(CertificateStatus::Issued)
            .into_paginator()
            .send();

        let mut certificates = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| {
                LookupError::Api(format!(
                    "Failed to list certificates in {}: {}",
                    region,
                    aws_sdk_acm::error::DisplayErrorContext(&e)
                ))
            })?;
            certificates.extend(page.certificate_summary_list().iter().filter_map(certificate_from));
        }
        debug!("{} issued certificates in {}", certificates.len(), region);
        Ok(certificates)
    }
}

/// Route53 hosted zones
pub struct Route53Registry {
    client: aws_sdk_route53::Client,
}

impl Route53Registry {
    pub fn new(config: &SdkConfig) -> Self {
        let conf = aws_sdk_route53::config::Builder::from(config)
            .region(Region::new(ROUTE53_REGION))
            .build();
        Self {
            client: aws_sdk_route53::Client::from_conf(conf),
        }
    }
}

fn zone_from(zone: &Route53Zone) -> HostedZone {
    HostedZone {
        id: zone
            .id()
            .strip_prefix(HOSTED_ZONE_PREFIX)
            .unwrap_or(zone.id())
            .to_string(),
        name: zone.name().to_string(),
        private: zone.config().is_some_and(|c| c.private_zone()),
    }
}

#[async_trait]
impl ZoneRegistry for Route53Registry {
    async fn zones_by_name(&self, domain: &str) -> Result<Vec<HostedZone>, LookupError> {
        let output = self
            .client
            .list_hosted_zones_by_name()
            .dns_name(domain)
            .send()
            .await
            .map_err(|e| {
                LookupError::Api(format!(
                    "Failed to list hosted zones for {}: {}",
                    domain,
                    aws_sdk_route53::error::DisplayErrorContext(&e)
                ))
            })?;
        Ok(output.hosted_zones().iter().map(zone_from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_acm::primitives::DateTime as SmithyDateTime;
    use aws_sdk_acm::types::CertificateType;
    use skylift_core::lookup::AMAZON_ISSUED;

    #[test]
    fn certificate_summary_conversion() {
        let summary = AcmSummary::builder()
            .certificate_arn("arn:aws:acm:us-east-1:123456789012:certificate/abc")
            .domain_name("example.com")
            .r#type(CertificateType::AmazonIssued)
            .issued_at(SmithyDateTime::from_secs(1_700_000_000))
            .build();

        let cert = certificate_from(&summary).unwrap();
        assert_eq!(cert.domain_name, "example.com");
        assert_eq!(cert.certificate_type, AMAZON_ISSUED);
        assert_eq!(cert.issued_at.map(|t| t.timestamp()), Some(1_700_000_000));
    }

    #[test]
    fn certificate_without_arn_is_skipped() {
        let summary = AcmSummary::builder().domain_name("example.com").build();
        assert!(certificate_from(&summary).is_none());
    }

    #[test]
    fn zone_id_prefix_is_stripped() {
        let zone = Route53Zone::builder()
            .id("/hostedzone/Z123EXAMPLE")
            .name("example.com.")
            .caller_reference("ref")
            .build()
            .unwrap();

        let converted = zone_from(&zone);
        assert_eq!(converted.id, "Z123EXAMPLE");
        assert_eq!(converted.name, "example.com.");
        assert!(!converted.private);
    }
}
