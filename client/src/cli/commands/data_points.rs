use serde_json::Value;
use windcalm_client::{DpValue, WindcalmClientError};

use crate::{Params, utils::create_client};

pub async fn get_data_point(params: Params, dp: u32) -> Result<(), WindcalmClientError> {
    let client = create_client(&params).await?;
    let value = client.get(dp).await;
    client.transport().stop().await;
    println!("{dp}: {}", value?);
    Ok(())
}

pub async fn set_data_point(
    params: Params,
    dp: u32,
    raw: &str,
) -> Result<(), WindcalmClientError> {
    let value = parse_value(raw);
    let client = create_client(&params).await?;
    let result = client.set(dp, value.clone()).await;
    client.transport().stop().await;
    result?;
    println!("{dp} set to {value}");
    Ok(())
}

fn parse_value(raw: &str) -> DpValue {
    serde_json::from_str::<Value>(raw)
        .ok()
        .as_ref()
        .and_then(DpValue::from_json)
        .unwrap_or_else(|| DpValue::from(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("true"), DpValue::Boolean(true));
        assert_eq!(parse_value("4"), DpValue::Number(4.0));
        assert_eq!(parse_value("\"forward\""), DpValue::from("forward"));
        assert_eq!(parse_value("reverse"), DpValue::from("reverse"));
    }
}
