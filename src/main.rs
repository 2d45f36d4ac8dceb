//! Interactive shell over one SimpleFS-formatted disk image.
//!
//! Structured like this codebase's other interactive command (its disk-partitioning tool):
//! a `print_usage`/`print_help` pair, a `handle_cmd` dispatcher matching on the command word,
//! and a `prompt` helper that flushes stdout before blocking on a line of stdin. Unlike that
//! sibling, nothing here needs hidden input, so only the flush-then-read-line half survives.

use std::fs::File;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::process::exit;

use simplefs::block_device::FileBlockDevice;
use simplefs::defrag;
use simplefs::fs::FileSystem;

const COPY_CHUNK: usize = 16384;

/// Writes an error to stderr, then exits. Matches the `bin: error: msg` convention used by
/// this codebase's other command-line tools.
fn error<M: std::fmt::Display>(bin: &str, msg: M) -> ! {
	eprintln!("{bin}: error: {msg}");
	exit(1);
}

fn print_usage(bin: &str) {
	println!("use: {bin} <diskfile> <nblocks>");
}

fn print_help() {
	println!("Commands are:");
	println!("    format");
	println!("    mount");
	println!("    debug");
	println!("    defrag");
	println!("    create");
	println!("    delete  <inode number>");
	println!("    getsize <inode number>");
	println!("    cat     <inode number>");
	println!("    copyin  <file> <inode number>");
	println!("    copyout <inode number> <file>");
	println!("    help");
	println!("    quit");
	println!("    exit");
}

/// Prints `prompt`, flushes stdout, then blocks for one line of stdin, trimmed of its
/// trailing newline. Returns `None` on EOF.
fn prompt(text: &str) -> Option<String> {
	print!("{text}");
	io::stdout().flush().ok();
	let mut line = String::new();
	let n = io::stdin().lock().read_line(&mut line).ok()?;
	if n == 0 {
		return None;
	}
	Some(line.trim_end_matches(['\n', '\r']).to_string())
}

fn copyin(fs: &mut FileSystem<FileBlockDevice>, hostfile: &Path, inumber: u32) {
	let mut file = match File::open(hostfile) {
		Ok(f) => f,
		Err(e) => {
			println!("copyin: cannot open {}: {e}", hostfile.display());
			return;
		}
	};
	let mut buf = [0u8; COPY_CHUNK];
	let mut offset = 0usize;
	loop {
		let n = match file.read(&mut buf) {
			Ok(0) => break,
			Ok(n) => n,
			Err(e) => {
				println!("copyin: read error: {e}");
				return;
			}
		};
		let written = fs.write(inumber, &buf, n, offset);
		offset += written;
		if written != n {
			println!("copyin: disk is full, only copied {offset} bytes");
			return;
		}
	}
	println!("{offset} bytes copied");
}

fn copyout(fs: &mut FileSystem<FileBlockDevice>, inumber: u32, hostfile: &Path) {
	let mut file = match File::create(hostfile) {
		Ok(f) => f,
		Err(e) => {
			println!("copyout: cannot create {}: {e}", hostfile.display());
			return;
		}
	};
	let mut buf = [0u8; COPY_CHUNK];
	let mut offset = 0usize;
	loop {
		let n = fs.read(inumber, &mut buf, COPY_CHUNK, offset);
		if n == 0 {
			break;
		}
		if let Err(e) = file.write_all(&buf[..n]) {
			println!("copyout: write error: {e}");
			return;
		}
		offset += n;
	}
	println!("{offset} bytes copied");
}

fn cat(fs: &mut FileSystem<FileBlockDevice>, inumber: u32) {
	let size = fs.getsize(inumber);
	if size < 0 {
		println!("cat: inode {inumber} is invalid");
		return;
	}
	let mut buf = [0u8; COPY_CHUNK];
	let mut offset = 0usize;
	let stdout = io::stdout();
	let mut out = stdout.lock();
	loop {
		let n = fs.read(inumber, &mut buf, COPY_CHUNK, offset);
		if n == 0 {
			break;
		}
		let _ = out.write_all(&buf[..n]);
		offset += n;
	}
}

/// Runs one command, returning `false` when the shell should stop looping. `quit`/`exit` signal
/// this instead of calling `process::exit` directly so the disk file's `Drop` impl still runs
/// and flushes before the process exits.
fn handle_cmd(fs: &mut FileSystem<FileBlockDevice>, cmd: &str, rest: &str) -> bool {
	let mut words = rest.split_whitespace();
	match cmd {
		"format" => {
			if fs.format() {
				println!("disk formatted.");
			} else {
				println!("format failed: disk already mounted.");
			}
		}

		"mount" => {
			if fs.mount() {
				println!("disk mounted.");
			} else {
				println!("mount failed.");
			}
		}

		"debug" => fs.debug(),

		"defrag" => {
			if defrag::defrag(fs) {
				println!("disk defragmented.");
			} else {
				println!("defrag failed: disk not mounted.");
			}
		}

		"create" => {
			let inumber = fs.create();
			if inumber > 0 {
				println!("created inode {inumber}");
			} else {
				println!("create failed.");
			}
		}

		"delete" => match words.next().and_then(|s| s.parse().ok()) {
			Some(inumber) if fs.delete(inumber) => println!("inode {inumber} deleted"),
			_ => println!("delete failed."),
		},

		"getsize" => match words.next().and_then(|s| s.parse().ok()) {
			Some(inumber) => {
				let size = fs.getsize(inumber);
				if size >= 0 {
					println!("inode {inumber} has size {size}");
				} else {
					println!("getsize failed.");
				}
			}
			None => println!("getsize failed."),
		},

		"cat" => match words.next().and_then(|s| s.parse().ok()) {
			Some(inumber) => cat(fs, inumber),
			None => println!("cat: missing inode number"),
		},

		"copyin" => {
			let hostfile = words.next();
			let inumber = words.next().and_then(|s| s.parse().ok());
			match (hostfile, inumber) {
				(Some(hostfile), Some(inumber)) => copyin(fs, Path::new(hostfile), inumber),
				_ => println!("copyin: usage: copyin <file> <inode number>"),
			}
		}

		"copyout" => {
			let inumber = words.next().and_then(|s| s.parse().ok());
			let hostfile = words.next();
			match (inumber, hostfile) {
				(Some(inumber), Some(hostfile)) => copyout(fs, inumber, Path::new(hostfile)),
				_ => println!("copyout: usage: copyout <inode number> <file>"),
			}
		}

		"help" => print_help(),

		"quit" | "exit" => {
			println!("closing emulated disk.");
			return false;
		}

		other => println!("{other}: command not found."),
	}
	true
}

fn main() {
	let bin = "simplefs";
	let mut args = std::env::args_os().skip(1);
	let (diskfile, nblocks) = match (args.next(), args.next()) {
		(Some(d), Some(n)) if args.next().is_none() => (PathBuf::from(d), n),
		_ => {
			print_usage(bin);
			exit(1);
		}
	};
	let nblocks: u32 = match nblocks.to_str().and_then(|s| s.parse().ok()) {
		Some(n) if n > 0 => n,
		_ => error(bin, "nblocks must be a positive integer"),
	};

	let dev = FileBlockDevice::init(&diskfile, nblocks)
		.unwrap_or_else(|e| error(bin, format_args!("cannot open {}: {e}", diskfile.display())));
	println!(
		"opened emulated disk image {} with {nblocks} blocks",
		diskfile.display()
	);

	let mut fs = FileSystem::new(dev);
	loop {
		let Some(line) = prompt("simplefs> ") else {
			println!("closing emulated disk.");
			break;
		};
		let line = line.trim();
		if line.is_empty() {
			continue;
		}
		let (cmd, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
		if !handle_cmd(&mut fs, cmd, rest.trim()) {
			break;
		}
	}
}
