//! Page handlers
//!
//! Pages are plain HTML for humans. Failures render through
//! [`AppError`]'s `IntoResponse`, which also answers with 200.

use axum::{
    extract::{RawPathParams, State},
    response::Html,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::escape_html;
use crate::controller::GadgetMode;
use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::system::ExitRequest;

const HOME_LINK: &str = "<a href='/'>Return to USBODE homepage</a>";

/// Lets the response reach the browser before main starts tearing down
const EXIT_DELAY: Duration = Duration::from_millis(500);

/// Decode a `quote_plus` style path segment
pub fn decode_plus(raw: &str) -> Result<String> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .map_err(|e| AppError::BadRequest(format!("Invalid file name encoding: {}", e)))
}

fn mount_link(name: &str) -> String {
    format!(
        "<a href='/mount/{}'>{}</a><br><br>",
        urlencoding::encode(name),
        escape_html(name)
    )
}

fn mounted_name(path: Option<&std::path::Path>) -> String {
    path.map(|p| escape_html(&p.display().to_string()))
        .unwrap_or_else(|| "NONE".to_string())
}

pub async fn index(State(state): State<Arc<AppState>>) -> Html<String> {
    let status = state.controller.status().await;
    Html(format!(
        "Welcome to USBODE, the USB Optical Drive Emulator!<br>\
         To switch modes click here: <a href='/switch'>/switch</a><br>\
         Currently Serving: {}.<br>\
         Current Mode is: {}<br>\
         Images in store: {}<br>\
         <a href='/list'>Load Another Image</a><br><br>\
         Version Number {}<br><br>\
         <a href='/shutdown'>Shutdown the device</a>",
        mounted_name(status.mounted_image.as_deref()),
        status.mode,
        status.image_count,
        env!("CARGO_PKG_VERSION"),
    ))
}

pub async fn switch_mode(State(state): State<Arc<AppState>>) -> Result<Html<String>> {
    let mode = state.controller.toggle_mode().await?;
    Ok(Html(format!(
        "Switching mode... Current mode is {}<br><br>\
         <a href='/switch'>Need to switch modes again?</a><br><br>\
         <a href='/setup'>Return to Setup</a><br><br>{}",
        mode, HOME_LINK
    )))
}

pub async fn list_images(State(state): State<Arc<AppState>>) -> Html<String> {
    let status = state.controller.status().await;
    let mut body = String::new();
    if status.mode == GadgetMode::MassStorage {
        body.push_str(
            "The store is shared with the host in mass storage mode, so this list may be \
             out of date. <a href='/switch'>Switch Modes</a>, then go back to this page.<br><br>",
        );
    }
    for name in state.controller.catalog().list() {
        body.push_str(&mount_link(&name));
    }

    Html(format!(
        "Current File Loaded: {}<br><br>\
         To load a different ISO, select it. No disconnection between the OS and the \
         USBODE will occur.<br><br>{}<br>{}",
        mounted_name(status.mounted_image.as_deref()),
        body,
        HOME_LINK
    ))
}

pub async fn mount_image(
    State(state): State<Arc<AppState>>,
    params: RawPathParams,
) -> Result<Html<String>> {
    let raw = params
        .iter()
        .find(|(key, _)| *key == "file")
        .map(|(_, value)| value.to_string())
        .ok_or_else(|| AppError::BadRequest("Missing file name".to_string()))?;
    mount_by_encoded_name(&state, &raw).await
}

async fn mount_by_encoded_name(state: &AppState, raw: &str) -> Result<Html<String>> {
    let name = decode_plus(raw)?;
    info!("Web request to mount {}", name);
    let mode = state.controller.mount_catalog_image(&name).await?;
    Ok(Html(format!(
        "Attempting to mount {}... Current mode is {}<br>{}",
        escape_html(&name),
        mode,
        HOME_LINK
    )))
}

pub async fn mount_alternate_source(State(state): State<Arc<AppState>>) -> Result<Html<String>> {
    let source = state.config.get().storage.alternate_source.clone();
    state
        .controller
        .change_mounted_image(std::path::Path::new(&source))
        .await?;
    Ok(Html(format!(
        "Attempting to mount {} (must already be present)...<br>{}",
        escape_html(&source),
        HOME_LINK
    )))
}

pub async fn setup(State(state): State<Arc<AppState>>) -> Html<String> {
    let images = state.controller.catalog().list();
    if images.is_empty() {
        return Html(format!(
            "No images found in {}. Please add at least one ISO image and try again.<br>\
             Adding images requires ExFAT support, connect this device to a system that \
             supports ExFAT, then <a href='/switch'>switch modes</a><br><br>\
             <a href='/shutdown'>Shutdown the device</a>",
            escape_html(&state.controller.catalog().store_dir().display().to_string())
        ));
    }

    let links: String = images.iter().map(|name| mount_link(name)).collect();
    Html(format!(
        "Current File Loaded: NONE (First Setup!)<br><br>\
         To load a different ISO, select it. Be aware the system will disconnect and \
         reconnect the optical drive.<br><br>{}<br>{}",
        links, HOME_LINK
    ))
}

pub async fn shutdown(State(state): State<Arc<AppState>>) -> Html<String> {
    schedule_exit(state, ExitRequest::PowerOff);
    Html("Shutting down the device now".to_string())
}

pub async fn exit(State(state): State<Arc<AppState>>) -> Html<String> {
    schedule_exit(state, ExitRequest::Exit);
    Html("Exiting the app now".to_string())
}

fn schedule_exit(state: Arc<AppState>, request: ExitRequest) {
    info!("Web request: {:?}", request);
    tokio::spawn(async move {
        tokio::time::sleep(EXIT_DELAY).await;
        state.request_exit(request);
    });
}
