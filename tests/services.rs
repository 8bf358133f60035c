//! SOAP web service calls and the parameter/account CGIs against a mock device.

mod common;

use serde_json::json;

use axis_vapix::params::{ list_accounts, list_params, update_params };
use axis_vapix::soap::SOAP_PATH;
use axis_vapix::{ FailureKind, ParamValue, Privilege, Transport };
use common::{ AuthMode, MockDevice, Reply };

const PARAM_CGI: &str = "/axis-cgi/param.cgi";
const PWDGRP_CGI: &str = "/axis-cgi/pwdgrp.cgi";

const CERTIFICATES_REPLY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<SOAP-ENV:Envelope xmlns:SOAP-ENV="http://www.w3.org/2003/05/soap-envelope" xmlns:tds="http://www.onvif.org/ver10/device/wsdl" xmlns:tt="http://www.onvif.org/ver10/schema">
<SOAP-ENV:Body><tds:GetCertificatesResponse><tds:NvtCertificate><tt:CertificateID>default</tt:CertificateID></tds:NvtCertificate></tds:GetCertificatesResponse></SOAP-ENV:Body>
</SOAP-ENV:Envelope>"#;

const FAULT_REPLY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<SOAP-ENV:Envelope xmlns:SOAP-ENV="http://www.w3.org/2003/05/soap-envelope">
<SOAP-ENV:Body><SOAP-ENV:Fault><SOAP-ENV:Code><SOAP-ENV:Value>SOAP-ENV:Sender</SOAP-ENV:Value></SOAP-ENV:Code><SOAP-ENV:Reason><SOAP-ENV:Text xml:lang="en">Unknown certificate</SOAP-ENV:Text></SOAP-ENV:Reason></SOAP-ENV:Fault></SOAP-ENV:Body>
</SOAP-ENV:Envelope>"#;

const GET_CERTIFICATES: &str = r#"<tds:GetCertificates xmlns="http://www.onvif.org/ver10/device/wsdl"></tds:GetCertificates>"#;

#[tokio::test]
async fn test_soap_call_returns_body_content() {
    let mock = MockDevice::start(AuthMode::Digest, vec![(SOAP_PATH, Reply::xml(CERTIFICATES_REPLY))]).await;
    let transport = Transport::new().unwrap();

    let body = transport.soap(&mock.device(), GET_CERTIFICATES).await.unwrap();
    let inner = body.as_text().unwrap();
    assert!(inner.starts_with("<tds:GetCertificatesResponse>"));
    assert!(inner.contains("<tt:CertificateID>default</tt:CertificateID>"));

    let requests = mock.requests_to(SOAP_PATH);
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].method, "POST");
    assert!(requests[1].content_type.as_deref().unwrap().starts_with("application/soap+xml"));
    let envelope = requests[1].body_text();
    assert!(envelope.starts_with("<SOAP-ENV:Envelope "));
    assert!(envelope.contains(GET_CERTIFICATES));
}

#[tokio::test]
async fn test_soap_fault_is_application_error() {
    let mock = MockDevice::start(AuthMode::Digest, vec![(SOAP_PATH, Reply::xml(FAULT_REPLY))]).await;
    let transport = Transport::new().unwrap();

    let err = transport.soap(&mock.device(), GET_CERTIFICATES).await.unwrap_err();
    assert_eq!(err.kind, FailureKind::ApplicationError);
    assert_eq!(err.message, "Unknown certificate");
}

#[tokio::test]
async fn test_soap_reply_without_envelope_is_parse_error() {
    let mock = MockDevice::start(AuthMode::Open, vec![(SOAP_PATH, Reply::text("<html><body>Maintenance</body></html>"))]).await;
    let transport = Transport::new().unwrap();

    let err = transport.soap(&mock.device(), GET_CERTIFICATES).await.unwrap_err();
    assert_eq!(err.kind, FailureKind::ParseError);
    assert!(err.body.is_some());
}

#[tokio::test]
async fn test_list_params_builds_tree() {
    let dump = "root.Brand.Brand=AXIS\nroot.Brand.ProdNbr=P3245-LVE\nroot.Brand.WebURL=http://www.axis.com\n";
    let mock = MockDevice::start(AuthMode::Digest, vec![(PARAM_CGI, Reply::text(dump))]).await;
    let transport = Transport::new().unwrap();

    let tree = list_params(&transport, &mock.device(), "Brand").await.unwrap();
    assert_eq!(tree.get("ProdNbr"), Some(&ParamValue::Text("P3245-LVE".to_string())));
    assert_eq!(tree.get("WebURL"), Some(&ParamValue::Text("http://www.axis.com".to_string())));
    assert_eq!(mock.requests()[1].query.as_deref(), Some("action=list&group=Brand"));
}

#[tokio::test]
async fn test_list_params_error_reply() {
    let mock = MockDevice::start(AuthMode::Digest, vec![(PARAM_CGI, Reply::text("Error: 3\n"))]).await;
    let transport = Transport::new().unwrap();

    let err = list_params(&transport, &mock.device(), "Nope").await.unwrap_err();
    assert_eq!(err.kind, FailureKind::ApplicationError);
}

#[tokio::test]
async fn test_update_params_sends_leaf_values() {
    let mock = MockDevice::start(AuthMode::Digest, vec![(PARAM_CGI, Reply::text("OK"))]).await;
    let transport = Transport::new().unwrap();
    let values = json!({
        "Enabled": true,
        "String": "Gate 1 & 2",
        "Position": {"X": 10},
        "Size": 12,
        "Gate Name": "North"
    });

    update_params(&transport, &mock.device(), "Image.I0.Text", &values).await.unwrap();

    let query = mock.requests()[1].query.clone().unwrap();
    assert!(query.starts_with("action=update"));
    assert!(query.contains("root.Image.I0.Text.Enabled=yes"));
    assert!(query.contains("root.Image.I0.Text.String=Gate+1+%26+2"));
    assert!(query.contains("root.Image.I0.Text.Size=12"));
    assert!(query.contains("root.Image.I0.Text.Gate+Name=North"));
    assert!(!query.contains("Position"));
}

#[tokio::test]
async fn test_update_params_rejected_by_device() {
    let reply = "# Error: Error setting 'root.Image.I0.Text.Bogus' to 'x'!\n";
    let mock = MockDevice::start(AuthMode::Digest, vec![(PARAM_CGI, Reply::text(reply))]).await;
    let transport = Transport::new().unwrap();

    let err = update_params(&transport, &mock.device(), "Image.I0.Text", &json!({"Bogus": "x"})).await.unwrap_err();
    assert_eq!(err.kind, FailureKind::ApplicationError);
    assert_eq!(err.message, "Error: Error setting 'root.Image.I0.Text.Bogus' to 'x'!");
}

#[tokio::test]
async fn test_list_accounts() {
    let reply = "admin=\"root,alice\"\ndigusers=\"root,alice,bob,eve\"\noperator=\"root,alice\"\nviewer=\"root,alice,bob\"\n";
    let mock = MockDevice::start(AuthMode::Digest, vec![(PWDGRP_CGI, Reply::text(reply))]).await;
    let transport = Transport::new().unwrap();

    let accounts = list_accounts(&transport, &mock.device()).await.unwrap();
    let summary: Vec<(&str, Privilege)> = accounts.iter().map(|a| (a.name.as_str(), a.privileges)).collect();
    assert_eq!(
        summary,
        vec![("root", Privilege::System), ("alice", Privilege::Admin), ("bob", Privilege::Viewer)]
    );
    assert_eq!(mock.requests()[1].query.as_deref(), Some("action=get"));
}
