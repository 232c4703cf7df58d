use std::io::ErrorKind;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::PacketError;

use super::parsing::{
    LENGTH_PREFIX_SIZE, PacketState, ReadWritePacket, decode_body, encode_packet, frame_size,
};

/// Reads one whole packet, giving up after `timeout`. Not cancel safe: if the
/// future is dropped halfway, the stream is left in the middle of a frame.
pub async fn read_packet<T, R>(
    reader: &mut R,
    state: &PacketState,
    timeout: Duration,
) -> Result<T, PacketError>
where
    T: ReadWritePacket,
    R: AsyncRead + Unpin,
{
    tokio::time::timeout(timeout, read_frame(reader, state))
        .await
        .map_err(|_| PacketError::Timeout)?
}

async fn read_frame<T, R>(reader: &mut R, state: &PacketState) -> Result<T, PacketError>
where
    T: ReadWritePacket,
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    if let Err(err) = reader.read_exact(&mut prefix).await {
        return Err(match err.kind() {
            ErrorKind::UnexpectedEof => PacketError::Closed,
            _ => err.into(),
        });
    }

    let size = frame_size(prefix)?;
    let mut body = vec![0u8; size - LENGTH_PREFIX_SIZE];
    if let Err(err) = reader.read_exact(&mut body).await {
        return Err(match err.kind() {
            ErrorKind::UnexpectedEof => {
                PacketError::Framing(format!("connection closed inside a {size} byte packet"))
            }
            _ => err.into(),
        });
    }

    let packet: T = decode_body(body, state)?;
    tracing::debug!("Received {}", packet.get_name());

    Ok(packet)
}

/// A peer that stops reading is dropped once a write stalls this long.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(30);

pub async fn send_packet<T, W>(
    writer: &mut W,
    state: &PacketState,
    packet: &T,
) -> Result<(), PacketError>
where
    T: ReadWritePacket,
    W: AsyncWrite + Unpin,
{
    let data = encode_packet(packet, state)?;
    tokio::time::timeout(WRITE_TIMEOUT, async {
        writer.write_all(&data).await?;
        writer.flush().await
    })
    .await
    .map_err(|_| PacketError::Timeout)??;

    tracing::debug!("Sent {}", packet.get_name());

    Ok(())
}

#[cfg(test)]
mod tests {
    use binrw::binrw;
    use tokio::io::duplex;

    use crate::packet::PacketCipher;

    use super::*;

    #[binrw]
    #[brw(little)]
    #[br(import(_size: u32))]
    #[derive(Debug, PartialEq)]
    enum Heartbeat {
        #[brw(magic = 0x10u8)]
        Beat { sequence: u32 },
    }

    impl ReadWritePacket for Heartbeat {
        fn get_name(&self) -> &'static str {
            "Beat"
        }
    }

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn send_then_read() {
        let (mut client, mut server) = duplex(1024);
        let state = PacketState::encrypted(PacketCipher::new(b"shared key").unwrap());

        send_packet(&mut client, &state, &Heartbeat::Beat { sequence: 1 })
            .await
            .unwrap();
        send_packet(&mut client, &state, &Heartbeat::Beat { sequence: 2 })
            .await
            .unwrap();

        for sequence in 1..=2 {
            let packet: Heartbeat = read_packet(&mut server, &state, TIMEOUT).await.unwrap();
            assert_eq!(packet, Heartbeat::Beat { sequence });
        }
    }

    #[tokio::test(start_paused = true)]
    async fn silence_times_out() {
        let (_client, mut server) = duplex(64);
        let result =
            read_packet::<Heartbeat, _>(&mut server, &PacketState::default(), TIMEOUT).await;
        assert!(matches!(result, Err(PacketError::Timeout)));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_peer_times_out() {
        // the peer never reads, so the frame can't fit
        let (mut client, _server) = duplex(4);
        let result = send_packet(
            &mut client,
            &PacketState::default(),
            &Heartbeat::Beat { sequence: 1 },
        )
        .await;
        assert!(matches!(result, Err(PacketError::Timeout)));
    }

    #[tokio::test]
    async fn clean_close() {
        let (client, mut server) = duplex(64);
        drop(client);

        let result =
            read_packet::<Heartbeat, _>(&mut server, &PacketState::default(), TIMEOUT).await;
        assert!(matches!(result, Err(PacketError::Closed)));
    }

    #[tokio::test]
    async fn close_inside_a_frame() {
        let (mut client, mut server) = duplex(64);
        client.write_all(&[0x07, 0x00, 0x10, 0x01]).await.unwrap();
        drop(client);

        let result =
            read_packet::<Heartbeat, _>(&mut server, &PacketState::default(), TIMEOUT).await;
        assert!(matches!(result, Err(PacketError::Framing(_))));
    }
}
