// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

//! Program download.
//!
//! Hubs with profile 1.2 or newer get the program in WriteUserRam commands
//! framed by two WriteUserProgramMeta commands. Older hubs take a size header
//! and blocks of raw bytes over the UART, each answered with a checksum.

use crate::bus::{EventBus, HubEvent};
use crate::connection::Link;
use crate::error::{CompileError, DownloadError};
use crate::runtime::{RuntimeInput, RuntimeState, RuntimeTracker};
use crate::settings::TimingSettings;
use crate::transport::GattDevice;
use brickwire_protocol::legacy::plan_download;
use brickwire_protocol::{Command, FileFormat, WRITE_USER_RAM_HEADER_SIZE};
use bytes::Bytes;
use log::{debug, info, warn};
use std::future::Future;
use tokio::time::timeout;

/// Produces the program image in the requested format
pub trait ProgramSource: Send + Sync {
    fn compile(
        &self,
        format: FileFormat,
    ) -> impl Future<Output = Result<Bytes, CompileError>> + Send;
}

/// An image that has been compiled already
#[derive(Debug, Clone)]
pub struct Precompiled(pub Bytes);

impl ProgramSource for Precompiled {
    fn compile(
        &self,
        _format: FileFormat,
    ) -> impl Future<Output = Result<Bytes, CompileError>> + Send {
        let image = self.0.clone();
        async move { Ok(image) }
    }
}

pub(crate) async fn download_and_run<D: GattDevice, P: ProgramSource>(
    link: &Link<D>,
    runtime: &RuntimeTracker,
    bus: &EventBus,
    timing: &TimingSettings,
    program: &P,
    format: FileFormat,
    slot: Option<u8>,
) -> Result<(), DownloadError> {
    let session = &link.session;
    let legacy = session.legacy.download;

    if !legacy && !(format.is_multi_file() && session.capabilities.supports(format)) {
        return Err(DownloadError::UnsupportedFormat(format));
    }

    let image = program.compile(format).await?;

    if !legacy {
        let max = session.capabilities.max_user_program_size as usize;
        if image.len() > max {
            return Err(DownloadError::ProgramTooLarge {
                size: image.len(),
                max,
            });
        }
    }

    let transition = runtime.apply(RuntimeInput::StartDownload).await;
    if transition.from == RuntimeState::Loading || transition.to != RuntimeState::Loading {
        warn!("Refusing download while hub is {}", transition.from);
        return Err(DownloadError::Busy(transition.from));
    }

    info!("Downloading {} bytes ({})", image.len(), format);
    bus.publish(HubEvent::DownloadStarted);

    let result = if legacy {
        download_legacy(link, bus, timing, &image).await
    } else {
        download_modern(link, bus, &image, slot).await
    };

    match &result {
        Ok(()) => {
            runtime.apply(RuntimeInput::FinishDownload).await;
            info!("Download finished");
            bus.publish(HubEvent::DownloadFinished);
        }
        Err(_) => {
            runtime.apply(RuntimeInput::FailDownload).await;
        }
    }
    result
}

async fn download_modern<D: GattDevice>(
    link: &Link<D>,
    bus: &EventBus,
    image: &Bytes,
    slot: Option<u8>,
) -> Result<(), DownloadError> {
    let total = image.len();
    let chunk_size = link
        .session
        .capabilities
        .max_write_size()
        .saturating_sub(WRITE_USER_RAM_HEADER_SIZE)
        .max(1);

    // invalidate the old program while the new one is written
    link.correlator
        .send(Command::WriteUserProgramMeta { size: 0 })
        .await?;

    for offset in (0..total).step_by(chunk_size) {
        let end = (offset + chunk_size).min(total);
        link.correlator
            .send(Command::WriteUserRam {
                offset: offset as u32,
                payload: image.slice(offset..end),
            })
            .await?;
        bus.publish(HubEvent::DownloadProgress(end as f32 / total as f32));
    }

    link.correlator
        .send(Command::WriteUserProgramMeta { size: total as u32 })
        .await?;

    let slot = if link.session.legacy.start_user_program {
        None
    } else {
        slot
    };
    link.correlator
        .send(Command::StartUserProgram { slot })
        .await?;
    Ok(())
}

async fn download_legacy<D: GattDevice>(
    link: &Link<D>,
    bus: &EventBus,
    timing: &TimingSettings,
    image: &Bytes,
) -> Result<(), DownloadError> {
    let total = image.len().max(1) as f32;
    let mut replies = bus.subscribe();

    for block in plan_download(image) {
        let mut sent = 0;
        for write in block.writes() {
            sent += write.len();
            link.uart.write(write).await?;
            if let Some(offset) = block.offset {
                bus.publish(HubEvent::DownloadProgress((offset + sent) as f32 / total));
            }
        }

        let expected = block.expected_checksum();
        let actual = timeout(
            timing.checksum_timeout(),
            replies.take(|event| match event {
                HubEvent::Checksum(checksum) => Some(Some(*checksum)),
                HubEvent::Disconnected => Some(None),
                _ => None,
            }),
        )
        .await
        .map_err(|_| DownloadError::ChecksumTimeout)?
        .flatten()
        .ok_or(DownloadError::NotConnected)?;

        debug!("Block checksum {:#04x}, expected {:#04x}", actual, expected);
        if actual != expected {
            return Err(DownloadError::ChecksumMismatch { expected, actual });
        }
    }
    // the hub starts the program on its own once the last block checked out
    Ok(())
}
