//! Axis VAPIX transport
//! Parameter and account operations over the legacy CGIs

use log::{ debug, info };
use serde_json::Value;
use url::form_urlencoded::byte_serialize;

use crate::accounts::{ parse_accounts, Account };
use crate::device::Device;
use crate::error::{ check_cgi_reply, Result, VapixError };
use crate::param_tree::{ ParamTree, ParamTreeParser };
use crate::transport::{ ResponseKind, Transport };

const PARAM_CGI: &str = "/axis-cgi/param.cgi";
const PWDGRP_CGI: &str = "/axis-cgi/pwdgrp.cgi";

/// List the parameters of `group` as a tree, with the `root.<group>.` prefix removed
pub async fn list_params(transport: &Transport, device: &Device, group: &str) -> Result<ParamTree> {
    let group = group.trim();
    if group.is_empty() || group.eq_ignore_ascii_case("root") {
        return Err(VapixError::invalid_input(format!("{} is not valid", group)));
    }

    let path = format!("{}?action=list&group={}", PARAM_CGI, encode(group));
    let text = transport.get(device, &path, ResponseKind::Text).await?.into_text()?;
    Ok(ParamTreeParser::default().parse(&text))
}

/// Update leaf parameters of `group` from a JSON object.
///
/// Booleans are sent as `yes`/`no`. Nested objects, arrays and nulls are
/// not sent; sub-groups have to be updated with their own group name.
pub async fn update_params(
    transport: &Transport,
    device: &Device,
    group: &str,
    values: &Value
) -> Result<()> {
    let group = group.trim();
    if group.is_empty() {
        return Err(VapixError::invalid_input("Missing parameter group"));
    }
    let Some(values) = values.as_object() else {
        return Err(VapixError::invalid_input("Parameters must be an object"));
    };

    let mut path = format!("{}?action=update", PARAM_CGI);
    for (key, value) in values {
        let Some(value) = param_value(value) else {
            debug!("Not updating sub group {}.{}", group, key);
            continue;
        };
        path.push('&');
        path.push_str(&update_field(group, key, &value));
    }

    let reply = transport.get(device, &path, ResponseKind::Text).await?.into_text()?;
    check_cgi_reply(&reply)?;
    info!("Updated {} parameters on {}", group, device.address);
    Ok(())
}

/// Accounts configured on the device, `root` first
pub async fn list_accounts(transport: &Transport, device: &Device) -> Result<Vec<Account>> {
    let path = format!("{}?action=get", PWDGRP_CGI);
    let text = transport.get(device, &path, ResponseKind::Text).await?.into_text()?;

    let list = parse_accounts(&text);
    if list.dropped > 0 {
        debug!("{} accounts on {} have no privilege group", list.dropped, device.address);
    }
    Ok(list.accounts)
}

fn param_value(value: &Value) -> Option<String> {
    match value {
        Value::Bool(true) => Some("yes".to_string()),
        Value::Bool(false) => Some("no".to_string()),
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// `root.<group>.<key>=<value>` with both sides form encoded
fn update_field(group: &str, key: &str, value: &str) -> String {
    format!("{}={}", encode(&format!("root.{}.{}", group, key)), encode(value))
}

fn encode(value: &str) -> String {
    byte_serialize(value.as_bytes()).collect()
}
