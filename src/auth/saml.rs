//! SAML 2.0 service provider.
//!
//! This module implements SP-initiated SSO for browser-based authentication:
//! - SP metadata generation
//! - AuthnRequest generation (HTTP-Redirect binding, optionally signed)
//! - Response/Assertion validation and attribute extraction
//! - LogoutRequest generation for SP-initiated Single Logout
//!
//! The orchestration layer talks to the [`ServiceProvider`] trait; the
//! samael-backed [`SamlServiceProvider`] is the shipped implementation, so an
//! alternate toolkit can be substituted without touching the login flow.

use base64::{Engine, engine::general_purpose::STANDARD};
use openssl::pkey::{PKey, Private};
use samael::{
    metadata::EntityDescriptor,
    service_provider::ServiceProviderBuilder,
};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    config::{AppConfig, InResponseToPolicy},
    models::TeamIdentityConfig,
};

/// NameID format requested from IdPs and advertised in SP metadata.
const NAME_ID_FORMAT_EMAIL: &str = "urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress";

/// SAML validation and generation failures.
///
/// Variants carry internal detail for logging; the HTTP boundary collapses
/// all of them into one generic client message.
#[derive(Debug, Error)]
pub enum SamlError {
    #[error("Response signature verification failed")]
    InvalidSignature,

    #[error("Assertion is outside its validity window")]
    ExpiredAssertion,

    #[error("Assertion audience does not match this service provider")]
    AudienceMismatch,

    #[error("Assertion is missing required attribute: {0}")]
    MissingRequiredAttribute(String),

    #[error("Malformed SAML response: {0}")]
    MalformedResponse(String),

    #[error("Response InResponseTo does not match the outstanding request")]
    ReplayDetected,

    #[error("SAML internal error: {0}")]
    Internal(String),
}

/// Normalized identity extracted from a validated assertion.
#[derive(Debug, Clone)]
pub struct IdentityAssertion {
    /// IdP's stable subject identifier
    pub name_id: String,
    /// Email address (from the mapped attribute, or the NameID itself)
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub groups: Vec<String>,
    /// SessionIndex from the AuthnStatement, used for SLO
    pub session_index: Option<String>,
}

/// An AuthnRequest rendered as an IdP redirect.
#[derive(Debug, Clone)]
pub struct AuthnRequestRedirect {
    /// Full IdP URL carrying the SAMLRequest (and signature) parameters
    pub url: String,
    /// The request ID, carried in the login state for InResponseTo checks
    pub request_id: String,
}

/// The SAML capability consumed by the login orchestration.
pub trait ServiceProvider: Send + Sync {
    /// Render SP metadata XML. Deterministic for a given override; no side
    /// effects.
    fn sp_metadata(&self, entity_id_override: Option<&str>) -> String;

    /// Build an AuthnRequest redirect for the team's IdP. Idempotent.
    fn build_authn_request(
        &self,
        config: &TeamIdentityConfig,
        relay_state: &str,
    ) -> Result<AuthnRequestRedirect, SamlError>;

    /// Validate an IdP response and extract the asserted identity.
    fn validate_response(
        &self,
        config: &TeamIdentityConfig,
        raw_response_b64: &str,
        expected_request_id: Option<&str>,
    ) -> Result<IdentityAssertion, SamlError>;

    /// Build an SP-initiated LogoutRequest redirect. `Ok(None)` when the
    /// IdP has no SLO endpoint configured.
    fn build_logout_request(
        &self,
        config: &TeamIdentityConfig,
        name_id: &str,
        session_index: Option<&str>,
        relay_state: &str,
    ) -> Result<Option<String>, SamlError>;
}

/// samael-backed service provider.
pub struct SamlServiceProvider {
    sp_entity_id: String,
    acs_url: String,
    slo_url: String,
    sign_requests: bool,
    sp_private_key: Option<String>,
    sp_certificate: Option<String>,
    in_response_to: InResponseToPolicy,
}

impl SamlServiceProvider {
    pub fn new(
        sp_entity_id: String,
        acs_url: String,
        slo_url: String,
        sign_requests: bool,
        sp_private_key: Option<String>,
        sp_certificate: Option<String>,
        in_response_to: InResponseToPolicy,
    ) -> Self {
        Self {
            sp_entity_id,
            acs_url,
            slo_url,
            sign_requests,
            sp_private_key,
            sp_certificate,
            in_response_to,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let base = config.server.public_url.trim_end_matches('/');
        Self::new(
            config.sp_entity_id(),
            config.acs_url(),
            format!("{}/auth/sso/logout", base),
            config.auth.saml.sign_requests,
            config.auth.saml.sp_private_key.clone(),
            config.auth.saml.sp_certificate.clone(),
            config.auth.saml.in_response_to,
        )
    }

    /// Build an EntityDescriptor for the team's IdP from its stored config.
    ///
    /// The certificate from the config is the trust anchor: when it is
    /// missing or unparsable this fails, and with it every response
    /// validation (fail closed).
    fn build_idp_metadata(&self, config: &TeamIdentityConfig) -> Result<EntityDescriptor, SamlError> {
        if config.idp_certificate.trim().is_empty() {
            return Err(SamlError::Internal(
                "IdP certificate is not configured".to_string(),
            ));
        }

        let xml = format!(
            r#"<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" entityID="{}">
    <md:IDPSSODescriptor protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol">
        <md:KeyDescriptor use="signing">
            <ds:KeyInfo xmlns:ds="http://www.w3.org/2000/09/xmldsig#">
                <ds:X509Data>
                    <ds:X509Certificate>{}</ds:X509Certificate>
                </ds:X509Data>
            </ds:KeyInfo>
        </md:KeyDescriptor>
        <md:SingleSignOnService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect" Location="{}"/>
        {}
    </md:IDPSSODescriptor>
</md:EntityDescriptor>"#,
            config.idp_entity_id,
            strip_pem_headers(&config.idp_certificate),
            config.idp_sso_url,
            config
                .idp_slo_url
                .as_ref()
                .map(|url| format!(
                    r#"<md:SingleLogoutService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect" Location="{}"/>"#,
                    url
                ))
                .unwrap_or_default()
        );

        samael::metadata::de::from_str(&xml).map_err(|e| {
            tracing::error!(team_id = %config.team_id, error = %e, "Failed to build IdP metadata from config");
            SamlError::Internal(format!("Failed to build IdP metadata: {}", e))
        })
    }

    /// Load the SP private key for request signing.
    fn load_private_key(&self) -> Result<PKey<Private>, SamlError> {
        let private_key_pem = self.sp_private_key.as_ref().ok_or_else(|| {
            SamlError::Internal(
                "sign_requests is enabled but sp_private_key is not configured".to_string(),
            )
        })?;

        PKey::private_key_from_pem(private_key_pem.as_bytes()).map_err(|e| {
            SamlError::Internal(format!(
                "Failed to parse SP private key (expected PEM format): {}",
                e
            ))
        })
    }

    /// Enforce the configured `InResponseTo` policy before handing the
    /// response to the toolkit.
    fn check_in_response_to(
        &self,
        response_xml: &str,
        expected_request_id: Option<&str>,
    ) -> Result<(), SamlError> {
        let presented = extract_in_response_to(response_xml);

        match self.in_response_to {
            InResponseToPolicy::Never => Ok(()),
            InResponseToPolicy::IfPresent => match (presented, expected_request_id) {
                (Some(presented), Some(expected)) if presented != expected => {
                    Err(SamlError::ReplayDetected)
                }
                (Some(_), None) => Err(SamlError::ReplayDetected),
                _ => Ok(()),
            },
            InResponseToPolicy::Always => match (presented, expected_request_id) {
                (Some(presented), Some(expected)) if presented == expected => Ok(()),
                _ => Err(SamlError::ReplayDetected),
            },
        }
    }

    /// Sign a redirect URL per SAML 2.0 Bindings section 3.4.4.1.
    ///
    /// The signature covers `SAMLRequest=value&RelayState=value&SigAlg=value`
    /// as they appear in the query string.
    fn sign_redirect_url(&self, mut url: url::Url) -> Result<url::Url, SamlError> {
        use openssl::{hash::MessageDigest, sign::Signer};

        let private_key = self.load_private_key()?;

        let sig_alg = if private_key.ec_key().is_ok() {
            "http://www.w3.org/2001/04/xmldsig-more#ecdsa-sha256"
        } else {
            "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256"
        };

        // SigAlg must be part of the signed content
        url.query_pairs_mut().append_pair("SigAlg", sig_alg);

        let query_string = url
            .query()
            .ok_or_else(|| SamlError::Internal("No query string to sign".to_string()))?
            .to_string();

        let mut signer = Signer::new(MessageDigest::sha256(), &private_key)
            .map_err(|e| SamlError::Internal(format!("Failed to create signer: {}", e)))?;
        signer
            .update(query_string.as_bytes())
            .map_err(|e| SamlError::Internal(format!("Failed to update signer: {}", e)))?;
        let signature = signer
            .sign_to_vec()
            .map_err(|e| SamlError::Internal(format!("Failed to sign: {}", e)))?;

        url.query_pairs_mut()
            .append_pair("Signature", &STANDARD.encode(&signature));

        Ok(url)
    }

    /// Build a SAML LogoutRequest targeted at the IdP's SLO endpoint.
    fn logout_request(
        &self,
        name_id: &str,
        destination: &str,
        session_index: Option<&str>,
    ) -> samael::schema::LogoutRequest {
        use samael::schema::{Issuer, LogoutRequest, NameID};

        LogoutRequest {
            id: Some(format!("_logout_{}", Uuid::new_v4())),
            version: Some("2.0".to_string()),
            issue_instant: Some(chrono::Utc::now()),
            destination: Some(destination.to_string()),
            issuer: Some(Issuer {
                value: Some(self.sp_entity_id.clone()),
                ..Default::default()
            }),
            name_id: Some(NameID {
                value: name_id.to_string(),
                format: Some(NAME_ID_FORMAT_EMAIL.to_string()),
            }),
            session_index: session_index.map(|s| s.to_string()),
            signature: None,
        }
    }
}

impl ServiceProvider for SamlServiceProvider {
    fn sp_metadata(&self, entity_id_override: Option<&str>) -> String {
        let entity_id = entity_id_override.unwrap_or(&self.sp_entity_id);

        let mut xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" entityID="{}">
  <md:SPSSODescriptor AuthnRequestsSigned="{}" WantAssertionsSigned="true" protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol">"#,
            entity_id, self.sign_requests
        );

        if let Some(sp_cert) = &self.sp_certificate {
            xml.push_str(&format!(
                r#"
    <md:KeyDescriptor use="signing">
      <ds:KeyInfo xmlns:ds="http://www.w3.org/2000/09/xmldsig#">
        <ds:X509Data>
          <ds:X509Certificate>{}</ds:X509Certificate>
        </ds:X509Data>
      </ds:KeyInfo>
    </md:KeyDescriptor>"#,
                strip_pem_headers(sp_cert)
            ));
        }

        xml.push_str(&format!(
            r#"
    <md:SingleLogoutService
        Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect"
        Location="{}"/>
    <md:NameIDFormat>{}</md:NameIDFormat>
    <md:AssertionConsumerService
        Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST"
        Location="{}"
        index="0"/>"#,
            self.slo_url, NAME_ID_FORMAT_EMAIL, self.acs_url
        ));

        xml.push_str(
            r#"
  </md:SPSSODescriptor>
</md:EntityDescriptor>"#,
        );

        xml
    }

    fn build_authn_request(
        &self,
        config: &TeamIdentityConfig,
        relay_state: &str,
    ) -> Result<AuthnRequestRedirect, SamlError> {
        let idp_metadata = self.build_idp_metadata(config)?;

        let sp = ServiceProviderBuilder::default()
            .entity_id(self.sp_entity_id.clone())
            .acs_url(self.acs_url.clone())
            .idp_metadata(idp_metadata)
            .authn_name_id_format(NAME_ID_FORMAT_EMAIL.to_string())
            .build()
            .map_err(|e| SamlError::Internal(format!("Failed to build ServiceProvider: {}", e)))?;

        let authn_request = sp
            .make_authentication_request(&config.idp_sso_url)
            .map_err(|e| SamlError::Internal(format!("Failed to create AuthnRequest: {}", e)))?;

        let request_id = authn_request.id.clone();

        let url = if self.sign_requests {
            let private_key = self.load_private_key()?;
            authn_request
                .signed_redirect(relay_state, private_key)
                .map_err(|e| SamlError::Internal(format!("Failed to sign AuthnRequest: {}", e)))?
                .ok_or_else(|| SamlError::Internal("AuthnRequest has no destination".to_string()))?
        } else {
            authn_request
                .redirect(relay_state)
                .map_err(|e| SamlError::Internal(format!("Failed to encode AuthnRequest: {}", e)))?
                .ok_or_else(|| SamlError::Internal("AuthnRequest has no destination".to_string()))?
        };

        Ok(AuthnRequestRedirect {
            url: url.to_string(),
            request_id,
        })
    }

    fn validate_response(
        &self,
        config: &TeamIdentityConfig,
        raw_response_b64: &str,
        expected_request_id: Option<&str>,
    ) -> Result<IdentityAssertion, SamlError> {
        // Structural checks first: bad encoding never reaches the toolkit.
        let response_bytes = STANDARD
            .decode(raw_response_b64.trim())
            .map_err(|e| SamlError::MalformedResponse(format!("invalid base64: {}", e)))?;
        let response_xml = String::from_utf8(response_bytes)
            .map_err(|e| SamlError::MalformedResponse(format!("invalid UTF-8: {}", e)))?;

        self.check_in_response_to(&response_xml, expected_request_id)?;

        let idp_metadata = self.build_idp_metadata(config)?;
        let sp = ServiceProviderBuilder::default()
            .entity_id(self.sp_entity_id.clone())
            .acs_url(self.acs_url.clone())
            .idp_metadata(idp_metadata)
            .build()
            .map_err(|e| SamlError::Internal(format!("Failed to build ServiceProvider: {}", e)))?;

        // Signature, validity window, audience, and InResponseTo membership
        // are enforced by the toolkit against the IdP metadata built above.
        let request_ids: Vec<&str> = match self.in_response_to {
            InResponseToPolicy::Never => Vec::new(),
            _ => expected_request_id.into_iter().collect(),
        };
        let assertion = sp
            .parse_base64_response(raw_response_b64.trim(), Some(&request_ids))
            .map_err(|e| classify_validation_error(&e.to_string()))?;

        let name_id = assertion
            .subject
            .as_ref()
            .and_then(|s| s.name_id.as_ref())
            .map(|n| n.value.clone())
            .ok_or_else(|| SamlError::MissingRequiredAttribute("NameID".to_string()))?;

        // Attribute extraction follows the team's mapping; unmapped source
        // attributes are ignored.
        let email = extract_attribute(&assertion, &config.email_attribute)
            .or_else(|| name_id.contains('@').then(|| name_id.clone()))
            .ok_or_else(|| SamlError::MissingRequiredAttribute("email".to_string()))?;

        let first_name = extract_attribute(&assertion, &config.first_name_attribute);
        let last_name = extract_attribute(&assertion, &config.last_name_attribute);
        let groups = extract_attribute_values(&assertion, &config.groups_attribute);

        let session_index = assertion
            .authn_statements
            .as_ref()
            .and_then(|stmts| stmts.first())
            .and_then(|stmt| stmt.session_index.clone());

        Ok(IdentityAssertion {
            name_id,
            email: email.to_lowercase(),
            first_name,
            last_name,
            groups,
            session_index,
        })
    }

    fn build_logout_request(
        &self,
        config: &TeamIdentityConfig,
        name_id: &str,
        session_index: Option<&str>,
        relay_state: &str,
    ) -> Result<Option<String>, SamlError> {
        use std::io::Write;

        use flate2::{Compression, write::DeflateEncoder};
        use samael::traits::ToXml;

        let Some(idp_slo_url) = &config.idp_slo_url else {
            return Ok(None);
        };

        let logout_request = self.logout_request(name_id, idp_slo_url, session_index);

        let xml = logout_request
            .to_string()
            .map_err(|e| SamlError::Internal(format!("Failed to serialize LogoutRequest: {:?}", e)))?;

        // HTTP-Redirect binding: DEFLATE, then base64, then URL-encode.
        let mut compressed = vec![];
        {
            let mut encoder = DeflateEncoder::new(&mut compressed, Compression::default());
            encoder
                .write_all(xml.as_bytes())
                .map_err(|e| SamlError::Internal(format!("Failed to compress LogoutRequest: {}", e)))?;
        }
        let encoded = STANDARD.encode(&compressed);

        let mut url: url::Url = idp_slo_url
            .parse()
            .map_err(|e| SamlError::Internal(format!("Failed to parse IdP SLO URL: {}", e)))?;

        url.query_pairs_mut().append_pair("SAMLRequest", &encoded);
        if !relay_state.is_empty() {
            url.query_pairs_mut().append_pair("RelayState", relay_state);
        }

        let final_url = if self.sign_requests {
            self.sign_redirect_url(url)?
        } else {
            url
        };

        tracing::debug!(
            idp_slo_url = %idp_slo_url,
            name_id = %name_id,
            signed = self.sign_requests,
            "Generated SAML LogoutRequest URL"
        );

        Ok(Some(final_url.to_string()))
    }
}

/// Strip PEM armor from a certificate, leaving the base64 body.
fn strip_pem_headers(pem: &str) -> String {
    pem.lines()
        .filter(|line| !line.starts_with("-----BEGIN") && !line.starts_with("-----END"))
        .collect::<Vec<_>>()
        .join("")
}

/// Pull the `InResponseTo` attribute off the outer Response element, if any.
///
/// This runs before toolkit validation so the replay policy can give a
/// precise rejection instead of a generic parse failure.
fn extract_in_response_to(response_xml: &str) -> Option<String> {
    let start = response_xml.find("InResponseTo=\"")? + "InResponseTo=\"".len();
    let rest = &response_xml[start..];
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}

/// Map a toolkit validation failure onto the error taxonomy.
///
/// samael reports failures as strings; the taxonomy is recovered by
/// inspecting the message. Anything unrecognized is treated as malformed,
/// which still fails closed.
fn classify_validation_error(message: &str) -> SamlError {
    let lower = message.to_lowercase();

    if lower.contains("signature")
        || lower.contains("digest")
        || lower.contains("certificate")
        || lower.contains("verification")
    {
        SamlError::InvalidSignature
    } else if lower.contains("expired")
        || lower.contains("not on or after")
        || lower.contains("notonorafter")
        || lower.contains("not before")
        || lower.contains("notbefore")
        || lower.contains("not yet valid")
    {
        SamlError::ExpiredAssertion
    } else if lower.contains("audience") {
        SamlError::AudienceMismatch
    } else if lower.contains("inresponseto") || lower.contains("in_response_to") {
        SamlError::ReplayDetected
    } else {
        SamlError::MalformedResponse(message.to_string())
    }
}

/// Extract a single attribute value from an assertion by mapped name.
fn extract_attribute(
    assertion: &samael::schema::Assertion,
    attr_name: &Option<String>,
) -> Option<String> {
    let attr_name = attr_name.as_ref()?;
    let statements = assertion.attribute_statements.as_ref()?;

    for statement in statements {
        for attr in &statement.attributes {
            if attr.name.as_deref() == Some(attr_name)
                || attr.friendly_name.as_deref() == Some(attr_name)
            {
                return attr
                    .values
                    .first()
                    .map(|v| v.value.clone().unwrap_or_default());
            }
        }
    }

    None
}

/// Extract all values of a multi-valued attribute (groups).
fn extract_attribute_values(
    assertion: &samael::schema::Assertion,
    attr_name: &Option<String>,
) -> Vec<String> {
    let Some(attr_name) = attr_name.as_ref() else {
        return vec![];
    };

    let Some(statements) = assertion.attribute_statements.as_ref() else {
        return vec![];
    };

    for statement in statements {
        for attr in &statement.attributes {
            if attr.name.as_deref() == Some(attr_name)
                || attr.friendly_name.as_deref() == Some(attr_name)
            {
                return attr.values.iter().filter_map(|v| v.value.clone()).collect();
            }
        }
    }

    vec![]
}

#[cfg(test)]
pub(crate) mod tests {
    use rstest::rstest;

    use super::*;
    use crate::models::SsoProvider;

    /// Generate a self-signed X.509 certificate and private key for testing.
    ///
    /// Returns (certificate_pem, private_key_pem).
    pub(crate) fn generate_test_certificate() -> (String, String) {
        use openssl::{
            asn1::Asn1Time,
            bn::BigNum,
            hash::MessageDigest,
            pkey::PKey,
            rsa::Rsa,
            x509::{X509Builder, X509NameBuilder},
        };

        let rsa = Rsa::generate(2048).unwrap();
        let private_key = PKey::from_rsa(rsa).unwrap();

        let mut x509_name = X509NameBuilder::new().unwrap();
        x509_name
            .append_entry_by_text("CN", "test-idp.example.com")
            .unwrap();
        let x509_name = x509_name.build();

        let mut builder = X509Builder::new().unwrap();
        builder.set_version(2).unwrap();

        let serial_number = BigNum::from_u32(1).unwrap();
        builder
            .set_serial_number(&serial_number.to_asn1_integer().unwrap())
            .unwrap();

        builder.set_subject_name(&x509_name).unwrap();
        builder.set_issuer_name(&x509_name).unwrap();
        builder.set_pubkey(&private_key).unwrap();
        builder
            .set_not_before(&Asn1Time::days_from_now(0).unwrap())
            .unwrap();
        builder
            .set_not_after(&Asn1Time::days_from_now(365).unwrap())
            .unwrap();
        builder.sign(&private_key, MessageDigest::sha256()).unwrap();

        let cert = builder.build();

        let cert_pem = String::from_utf8(cert.to_pem().unwrap()).unwrap();
        let key_pem = String::from_utf8(private_key.private_key_to_pem_pkcs8().unwrap()).unwrap();

        (cert_pem, key_pem)
    }

    pub(crate) fn test_team_config(cert_pem: &str) -> TeamIdentityConfig {
        let now = chrono::Utc::now();
        TeamIdentityConfig {
            id: Uuid::new_v4(),
            team_id: Uuid::new_v4(),
            provider: SsoProvider::Okta,
            idp_entity_id: "https://idp.example.com/metadata".to_string(),
            idp_sso_url: "https://idp.example.com/sso".to_string(),
            idp_slo_url: Some("https://idp.example.com/slo".to_string()),
            idp_certificate: cert_pem.to_string(),
            email_attribute: Some("email".to_string()),
            first_name_attribute: Some("firstName".to_string()),
            last_name_attribute: Some("lastName".to_string()),
            groups_attribute: Some("groups".to_string()),
            admin_groups: vec!["doc-admins".to_string()],
            require_sso: false,
            jit_provisioning: true,
            allow_email_linking: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn test_sp(policy: InResponseToPolicy) -> SamlServiceProvider {
        SamlServiceProvider::new(
            "https://docs.example.com/saml/metadata".to_string(),
            "https://docs.example.com/auth/sso/callback".to_string(),
            "https://docs.example.com/auth/sso/logout".to_string(),
            false,
            None,
            None,
            policy,
        )
    }

    #[test]
    fn test_sp_metadata_is_deterministic() {
        let sp = test_sp(InResponseToPolicy::IfPresent);
        assert_eq!(sp.sp_metadata(None), sp.sp_metadata(None));
    }

    #[test]
    fn test_sp_metadata_structure() {
        let sp = test_sp(InResponseToPolicy::IfPresent);
        let metadata = sp.sp_metadata(None);

        assert!(metadata.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(metadata.contains("entityID=\"https://docs.example.com/saml/metadata\""));
        assert!(metadata.contains("WantAssertionsSigned=\"true\""));
        assert!(metadata.contains("AuthnRequestsSigned=\"false\""));
        assert!(metadata.contains(
            "<md:NameIDFormat>urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress</md:NameIDFormat>"
        ));
        assert!(metadata.contains("Binding=\"urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST\""));
        assert!(metadata.contains("Location=\"https://docs.example.com/auth/sso/callback\""));
        assert!(metadata.contains("<md:SingleLogoutService"));
        assert!(metadata.contains("Location=\"https://docs.example.com/auth/sso/logout\""));
        assert!(metadata.contains("</md:EntityDescriptor>"));
    }

    #[test]
    fn test_sp_metadata_entity_id_override() {
        let sp = test_sp(InResponseToPolicy::IfPresent);
        let metadata = sp.sp_metadata(Some("urn:custom:sp"));
        assert!(metadata.contains("entityID=\"urn:custom:sp\""));
    }

    #[test]
    fn test_sp_metadata_includes_certificate_without_pem_armor() {
        let (cert_pem, _) = generate_test_certificate();
        let mut sp = test_sp(InResponseToPolicy::IfPresent);
        sp.sp_certificate = Some(cert_pem);

        let metadata = sp.sp_metadata(None);
        assert!(metadata.contains("<md:KeyDescriptor use=\"signing\">"));
        assert!(!metadata.contains("-----BEGIN CERTIFICATE-----"));
    }

    #[test]
    fn test_build_authn_request() {
        let (cert_pem, _) = generate_test_certificate();
        let config = test_team_config(&cert_pem);
        let sp = test_sp(InResponseToPolicy::IfPresent);

        let redirect = sp.build_authn_request(&config, "relay-123").unwrap();

        assert!(redirect.url.starts_with("https://idp.example.com/sso?"));
        assert!(redirect.url.contains("SAMLRequest="));
        assert!(redirect.url.contains("RelayState="));
        assert!(!redirect.request_id.is_empty());
    }

    #[test]
    fn test_build_authn_request_is_idempotent() {
        let (cert_pem, _) = generate_test_certificate();
        let config = test_team_config(&cert_pem);
        let sp = test_sp(InResponseToPolicy::IfPresent);

        // Two calls both succeed; no shared state is consumed.
        assert!(sp.build_authn_request(&config, "relay-1").is_ok());
        assert!(sp.build_authn_request(&config, "relay-2").is_ok());
    }

    #[test]
    fn test_signed_authn_request_has_signature_params() {
        let (cert_pem, key_pem) = generate_test_certificate();
        let config = test_team_config(&cert_pem);
        let mut sp = test_sp(InResponseToPolicy::IfPresent);
        sp.sign_requests = true;
        sp.sp_private_key = Some(key_pem);

        let redirect = sp.build_authn_request(&config, "relay").unwrap();
        assert!(redirect.url.contains("SigAlg="));
        assert!(redirect.url.contains("Signature="));
        assert!(redirect.url.contains("rsa-sha256"));
    }

    #[test]
    fn test_sign_requests_without_key_fails() {
        let (cert_pem, _) = generate_test_certificate();
        let config = test_team_config(&cert_pem);
        let mut sp = test_sp(InResponseToPolicy::IfPresent);
        sp.sign_requests = true;

        let result = sp.build_authn_request(&config, "relay");
        assert!(matches!(result, Err(SamlError::Internal(_))));
    }

    #[test]
    fn test_empty_certificate_fails_closed() {
        let (cert_pem, _) = generate_test_certificate();
        let mut config = test_team_config(&cert_pem);
        config.idp_certificate = "   ".to_string();
        let sp = test_sp(InResponseToPolicy::IfPresent);

        assert!(sp.build_authn_request(&config, "relay").is_err());
        let validation = sp.validate_response(&config, &STANDARD.encode(b"<xml/>"), None);
        assert!(validation.is_err());
    }

    #[test]
    fn test_validate_response_rejects_invalid_base64() {
        let (cert_pem, _) = generate_test_certificate();
        let config = test_team_config(&cert_pem);
        let sp = test_sp(InResponseToPolicy::IfPresent);

        let result = sp.validate_response(&config, "!!!not-base64!!!", None);
        assert!(matches!(result, Err(SamlError::MalformedResponse(_))));
    }

    #[test]
    fn test_validate_response_rejects_non_xml() {
        let (cert_pem, _) = generate_test_certificate();
        let config = test_team_config(&cert_pem);
        let sp = test_sp(InResponseToPolicy::IfPresent);

        let garbage = STANDARD.encode(b"this is not xml at all");
        let result = sp.validate_response(&config, &garbage, None);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_response_rejects_unsigned_response() {
        let (cert_pem, _) = generate_test_certificate();
        let config = test_team_config(&cert_pem);
        let sp = test_sp(InResponseToPolicy::Never);

        // Well-formed but unsigned response body; must never produce an
        // identity.
        let response = r#"<?xml version="1.0"?>
<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_resp1" Version="2.0" IssueInstant="2024-01-01T00:00:00Z">
  <saml:Issuer>https://idp.example.com/metadata</saml:Issuer>
  <samlp:Status><samlp:StatusCode Value="urn:oasis:names:tc:SAML:2.0:status:Success"/></samlp:Status>
</samlp:Response>"#;
        let result = sp.validate_response(&config, &STANDARD.encode(response), None);
        assert!(result.is_err());
    }

    #[rstest]
    #[case(InResponseToPolicy::IfPresent, Some("_req_other"), Some("_req_1"), true)]
    #[case(InResponseToPolicy::IfPresent, Some("_req_1"), Some("_req_1"), false)]
    #[case(InResponseToPolicy::IfPresent, None, Some("_req_1"), false)]
    #[case(InResponseToPolicy::Always, None, Some("_req_1"), true)]
    #[case(InResponseToPolicy::Always, Some("_req_1"), Some("_req_1"), false)]
    #[case(InResponseToPolicy::Never, Some("_req_other"), Some("_req_1"), false)]
    fn test_in_response_to_policy(
        #[case] policy: InResponseToPolicy,
        #[case] presented: Option<&str>,
        #[case] expected: Option<&str>,
        #[case] should_reject: bool,
    ) {
        let sp = test_sp(policy);
        let xml = match presented {
            Some(id) => format!(r#"<samlp:Response InResponseTo="{}" ID="_x"/>"#, id),
            None => r#"<samlp:Response ID="_x"/>"#.to_string(),
        };

        let result = sp.check_in_response_to(&xml, expected);
        if should_reject {
            assert!(matches!(result, Err(SamlError::ReplayDetected)));
        } else {
            assert!(result.is_ok());
        }
    }

    #[test]
    fn test_replay_rejection_happens_before_signature_work() {
        let (cert_pem, _) = generate_test_certificate();
        let config = test_team_config(&cert_pem);
        let sp = test_sp(InResponseToPolicy::IfPresent);

        let response = r#"<samlp:Response InResponseTo="_stale_request" ID="_x"/>"#;
        let result = sp.validate_response(&config, &STANDARD.encode(response), Some("_req_live"));
        assert!(matches!(result, Err(SamlError::ReplayDetected)));
    }

    #[rstest]
    #[case("failed to verify signature", SamlError::InvalidSignature)]
    #[case("digest mismatch in signed info", SamlError::InvalidSignature)]
    #[case("assertion expired at 2024-01-01", SamlError::ExpiredAssertion)]
    #[case("condition NotOnOrAfter violated", SamlError::ExpiredAssertion)]
    #[case("audience restriction did not match", SamlError::AudienceMismatch)]
    #[case("unexpected InResponseTo value", SamlError::ReplayDetected)]
    #[case("unexpected element <Foo>", SamlError::MalformedResponse(String::new()))]
    fn test_classify_validation_error(#[case] message: &str, #[case] expected: SamlError) {
        let classified = classify_validation_error(message);
        assert_eq!(
            std::mem::discriminant(&classified),
            std::mem::discriminant(&expected)
        );
    }

    #[test]
    fn test_extract_in_response_to() {
        let xml = r#"<samlp:Response Destination="https://sp/acs" InResponseTo="_abc123" ID="_r">"#;
        assert_eq!(extract_in_response_to(xml).as_deref(), Some("_abc123"));
        assert_eq!(extract_in_response_to(r#"<samlp:Response ID="_r">"#), None);
    }

    #[test]
    fn test_build_logout_request_url() {
        let (cert_pem, _) = generate_test_certificate();
        let config = test_team_config(&cert_pem);
        let sp = test_sp(InResponseToPolicy::IfPresent);

        let url = sp
            .build_logout_request(&config, "user@example.com", Some("_idx_1"), "relay-1")
            .unwrap()
            .expect("SLO URL is configured");

        assert!(url.starts_with("https://idp.example.com/slo?"));
        assert!(url.contains("SAMLRequest="));
        assert!(url.contains("RelayState=relay-1"));
    }

    #[test]
    fn test_build_logout_request_without_slo_url() {
        let (cert_pem, _) = generate_test_certificate();
        let mut config = test_team_config(&cert_pem);
        config.idp_slo_url = None;
        let sp = test_sp(InResponseToPolicy::IfPresent);

        let url = sp
            .build_logout_request(&config, "user@example.com", None, "relay")
            .unwrap();
        assert!(url.is_none());
    }

    #[test]
    fn test_build_signed_logout_request() {
        let (cert_pem, key_pem) = generate_test_certificate();
        let config = test_team_config(&cert_pem);
        let mut sp = test_sp(InResponseToPolicy::IfPresent);
        sp.sign_requests = true;
        sp.sp_private_key = Some(key_pem);

        let url = sp
            .build_logout_request(&config, "user@example.com", Some("_idx"), "relay")
            .unwrap()
            .unwrap();
        assert!(url.contains("SigAlg="));
        assert!(url.contains("Signature="));
    }

    #[test]
    fn test_logout_request_shape() {
        let sp = test_sp(InResponseToPolicy::IfPresent);
        let request =
            sp.logout_request("user@example.com", "https://idp.example.com/slo", Some("_i"));

        assert!(request.id.as_ref().unwrap().starts_with("_logout_"));
        assert_eq!(request.version.as_deref(), Some("2.0"));
        assert_eq!(
            request.destination.as_deref(),
            Some("https://idp.example.com/slo")
        );
        assert_eq!(
            request.issuer.unwrap().value.as_deref(),
            Some("https://docs.example.com/saml/metadata")
        );
        let name_id = request.name_id.unwrap();
        assert_eq!(name_id.value, "user@example.com");
        assert_eq!(name_id.format.as_deref(), Some(NAME_ID_FORMAT_EMAIL));
        assert_eq!(request.session_index.as_deref(), Some("_i"));
    }

    #[test]
    fn test_strip_pem_headers() {
        let pem = "-----BEGIN CERTIFICATE-----\nMIICabc\ndef123\n-----END CERTIFICATE-----";
        let stripped = strip_pem_headers(pem);
        assert_eq!(stripped, "MIICabcdef123");
    }
}
