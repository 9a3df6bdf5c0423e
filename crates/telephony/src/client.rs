//! Outbound call REST client
//!
//! Twilio-compatible call placement: basic-auth, form-encoded fields,
//! JSON responses carrying the call sid.

use crate::TelephonyError;

/// Parameters for one outbound call.
#[derive(Debug, Clone)]
pub struct PlaceCall {
    /// Destination number (E.164)
    pub to: String,
    /// URL the provider fetches when the call is answered
    pub answer_url: String,
    /// URL the provider posts call status changes to
    pub status_callback_url: String,
    /// Ask the provider to record the call
    pub record: bool,
}

/// REST client for the telephony provider.
pub struct TelephonyClient {
    http: reqwest::Client,
    api_base: String,
    account_sid: String,
    auth_token: String,
    from_number: String,
}

impl TelephonyClient {
    pub fn new(
        api_base: impl Into<String>,
        account_sid: impl Into<String>,
        auth_token: impl Into<String>,
        from_number: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.into(),
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
            from_number: from_number.into(),
        }
    }

    /// Place an outbound call. Returns the provider-issued call sid.
    pub async fn place_call(&self, call: &PlaceCall) -> Result<String, TelephonyError> {
        let mut form = vec![
            ("To", call.to.as_str()),
            ("From", self.from_number.as_str()),
            ("Url", call.answer_url.as_str()),
            ("Method", "POST"),
            ("StatusCallback", call.status_callback_url.as_str()),
        ];
        if call.record {
            form.push(("Record", "true"));
        }

        let resp = self
            .http
            .post(format!(
                "{}/Accounts/{}/Calls.json",
                self.api_base, self.account_sid
            ))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&form)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TelephonyError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let body: serde_json::Value = resp.json().await?;
        let sid = body["sid"]
            .as_str()
            .ok_or_else(|| TelephonyError::MalformedResponse("missing sid".to_string()))?;

        tracing::info!(call_sid = sid, to = %call.to, "outbound call placed");
        Ok(sid.to_string())
    }

    /// End an in-progress call.
    pub async fn end_call(&self, call_sid: &str) -> Result<(), TelephonyError> {
        let resp = self
            .http
            .post(format!(
                "{}/Accounts/{}/Calls/{}.json",
                self.api_base, self.account_sid, call_sid
            ))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("Status", "completed")])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TelephonyError::Api {
                status: status.as_u16(),
                body,
            });
        }

        tracing::info!(call_sid, "call ended via provider API");
        Ok(())
    }
}
