//! Little-endian CHARMM/OpenMM style DCD encoding.
//!
//! Every record is wrapped in Fortran markers: a 4-byte length before and
//! after the payload. Frames carry no unit cell block.

use std::io::{self, Read, Seek, SeekFrom, Write};

use serde::{Deserialize, Serialize};
use umb_core::Vec3;

/// One AKMA time unit in picoseconds.
pub const AKMA_TIME_PS: f64 = 0.048_888_21;

const NM_TO_ANGSTROM: f64 = 10.0;
const TITLE_WIDTH: usize = 80;
const HEADER_PAYLOAD: usize = 84;
const CHARMM_VERSION: i32 = 24;
// Byte offsets of NSET and NSTEP inside the file (after the leading marker and `CORD`).
const NSET_OFFSET: u64 = 8;
const NSTEP_OFFSET: u64 = 20;

/// Decoded header fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DcdHeader {
    /// NSET: number of frames.
    pub frames: usize,
    /// ISTART: step of the first frame.
    pub start_step: usize,
    /// NSAVC: steps between frames.
    pub interval: usize,
    /// NSTEP: step of the last frame.
    pub last_step: usize,
    /// DELTA converted back to picoseconds.
    pub timestep_ps: f64,
    /// Number of atoms per frame.
    pub atoms: usize,
    /// Title lines with trailing padding removed.
    pub titles: Vec<String>,
}

impl DcdHeader {
    /// Size in bytes of one encoded frame.
    pub fn frame_bytes(&self) -> u64 {
        3 * (8 + 4 * self.atoms as u64)
    }
}

/// Streaming DCD encoder. Frame and step counters are patched in on
/// [`DcdWriter::finish`].
pub struct DcdWriter<W: Write + Seek> {
    writer: W,
    atoms: usize,
    interval: usize,
    frames: usize,
}

impl<W: Write + Seek> DcdWriter<W> {
    /// Writes the header, title and atom-count records.
    pub fn new(
        mut writer: W,
        atoms: usize,
        interval: usize,
        timestep_ps: f64,
        titles: &[&str],
    ) -> io::Result<Self> {
        if atoms == 0 {
            return Err(invalid_input("number of atoms must be positive"));
        }
        let atoms_i32 = to_i32(atoms)?;
        let interval_i32 = to_i32(interval)?;

        let mut header = Vec::with_capacity(HEADER_PAYLOAD);
        header.extend_from_slice(b"CORD");
        let mut icntrl = [0i32; 20];
        icntrl[1] = interval_i32;
        icntrl[2] = interval_i32;
        icntrl[19] = CHARMM_VERSION;
        for (idx, value) in icntrl.iter().enumerate() {
            if idx == 9 {
                let delta = (timestep_ps / AKMA_TIME_PS) as f32;
                header.extend_from_slice(&delta.to_le_bytes());
            } else {
                header.extend_from_slice(&value.to_le_bytes());
            }
        }
        write_record(&mut writer, &header)?;

        let mut title_block = Vec::with_capacity(4 + titles.len() * TITLE_WIDTH);
        title_block.extend_from_slice(&to_i32(titles.len())?.to_le_bytes());
        for title in titles {
            let mut line = title.as_bytes().to_vec();
            line.resize(TITLE_WIDTH, b' ');
            title_block.extend_from_slice(&line);
        }
        write_record(&mut writer, &title_block)?;
        write_record(&mut writer, &atoms_i32.to_le_bytes())?;

        Ok(Self {
            writer,
            atoms,
            interval,
            frames: 0,
        })
    }

    /// Appends one frame given in nanometres.
    pub fn write_frame(&mut self, positions: &[Vec3]) -> io::Result<()> {
        if positions.len() != self.atoms {
            return Err(invalid_input("frame atom count does not match header"));
        }
        let mut block = Vec::with_capacity(4 * self.atoms);
        for axis in 0..3 {
            block.clear();
            for position in positions {
                let value = (position[axis] * NM_TO_ANGSTROM) as f32;
                block.extend_from_slice(&value.to_le_bytes());
            }
            write_record(&mut self.writer, &block)?;
        }
        self.frames += 1;
        Ok(())
    }

    /// Frames written so far.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Patches NSET and NSTEP, flushes and hands the sink back.
    pub fn finish(mut self) -> io::Result<W> {
        let end = self.writer.stream_position()?;
        let frames = to_i32(self.frames)?;
        let last_step = to_i32(self.frames * self.interval)?;
        self.writer.seek(SeekFrom::Start(NSET_OFFSET))?;
        self.writer.write_all(&frames.to_le_bytes())?;
        self.writer.seek(SeekFrom::Start(NSTEP_OFFSET))?;
        self.writer.write_all(&last_step.to_le_bytes())?;
        self.writer.seek(SeekFrom::Start(end))?;
        self.writer.flush()?;
        Ok(self.writer)
    }
}

/// Reads the header, title and atom-count records.
pub fn read_header<R: Read>(reader: &mut R) -> io::Result<DcdHeader> {
    let block = read_record(reader)?;
    if block.len() != HEADER_PAYLOAD || &block[0..4] != b"CORD" {
        return Err(invalid_data("missing CORD header"));
    }
    let field = |idx: usize| -> [u8; 4] {
        let start = 4 + 4 * idx;
        [block[start], block[start + 1], block[start + 2], block[start + 3]]
    };
    let count = |idx: usize| usize::try_from(i32::from_le_bytes(field(idx))).unwrap_or(0);
    let delta = f32::from_le_bytes(field(9));

    let title_block = read_record(reader)?;
    if title_block.len() < 4 {
        return Err(invalid_data("truncated title record"));
    }
    let titles = title_block[4..]
        .chunks(TITLE_WIDTH)
        .map(|line| String::from_utf8_lossy(line).trim_end().to_string())
        .collect();

    let atom_block = read_record(reader)?;
    if atom_block.len() != 4 {
        return Err(invalid_data("malformed atom count record"));
    }
    let atoms = i32::from_le_bytes([atom_block[0], atom_block[1], atom_block[2], atom_block[3]]);
    let atoms = usize::try_from(atoms).map_err(|_| invalid_data("negative atom count"))?;

    Ok(DcdHeader {
        frames: count(0),
        start_step: count(1),
        interval: count(2),
        last_step: count(3),
        timestep_ps: f64::from(delta) * AKMA_TIME_PS,
        atoms,
        titles,
    })
}

/// Reads the next frame in nanometres, or `None` at a clean end of file.
pub fn read_frame<R: Read>(reader: &mut R, atoms: usize) -> io::Result<Option<Vec<Vec3>>> {
    let mut axes = Vec::with_capacity(3);
    for axis in 0..3 {
        let block = match read_record(reader) {
            Ok(block) => block,
            Err(err) if axis == 0 && err.kind() == io::ErrorKind::UnexpectedEof => {
                return Ok(None)
            }
            Err(err) => return Err(err),
        };
        if block.len() != 4 * atoms {
            return Err(invalid_data("coordinate record has the wrong length"));
        }
        axes.push(block);
    }
    let value = |axis: usize, atom: usize| {
        let bytes = &axes[axis][4 * atom..4 * atom + 4];
        f64::from(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])) / NM_TO_ANGSTROM
    };
    Ok(Some(
        (0..atoms)
            .map(|atom| [value(0, atom), value(1, atom), value(2, atom)])
            .collect(),
    ))
}

/// Reads a whole trajectory.
pub fn read_dcd<R: Read>(mut reader: R) -> io::Result<(DcdHeader, Vec<Vec<Vec3>>)> {
    let header = read_header(&mut reader)?;
    let mut frames = Vec::with_capacity(header.frames);
    while let Some(frame) = read_frame(&mut reader, header.atoms)? {
        frames.push(frame);
    }
    Ok((header, frames))
}

fn write_record<W: Write>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    let marker = to_i32(payload.len())?.to_le_bytes();
    writer.write_all(&marker)?;
    writer.write_all(payload)?;
    writer.write_all(&marker)
}

fn read_record<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut marker = [0u8; 4];
    reader.read_exact(&mut marker)?;
    let len = usize::try_from(i32::from_le_bytes(marker))
        .map_err(|_| invalid_data("negative record length"))?;
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    let mut trailer = [0u8; 4];
    reader.read_exact(&mut trailer)?;
    if trailer != marker {
        return Err(invalid_data("record markers disagree"));
    }
    Ok(payload)
}

fn to_i32(value: usize) -> io::Result<i32> {
    i32::try_from(value).map_err(|_| invalid_input("value does not fit a DCD field"))
}

fn invalid_input(message: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, message.to_string())
}

fn invalid_data(message: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.to_string())
}
