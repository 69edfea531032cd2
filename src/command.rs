// Copyright Valkey GLIDE Project Contributors - SPDX Identifier: Apache-2.0

use crate::resp;

/// A single command under construction: the command name followed by its
/// arguments, each held as a byte string.
///
/// ```rust
/// use batch_core::command::cmd;
///
/// let mut set = cmd("SET");
/// set.arg("key").arg(42);
/// assert_eq!(set.get_packed_command(), b"*3\r\n$3\r\nSET\r\n$3\r\nkey\r\n$2\r\n42\r\n");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cmd {
    args: Vec<Vec<u8>>,
}

/// Shortcut to create a command with its name as the first argument.
pub fn cmd(name: &str) -> Cmd {
    let mut cmd = Cmd::new();
    cmd.arg(name);
    cmd
}

impl Cmd {
    pub fn new() -> Cmd {
        Cmd { args: Vec::new() }
    }

    /// Appends an argument. Returns `&mut self` so calls can be chained.
    pub fn arg<T: ToArg>(&mut self, arg: T) -> &mut Cmd {
        self.args.push(arg.to_arg());
        self
    }

    /// The uppercased command name, used for response callback dispatch and
    /// pipeline error annotation. Empty for an empty command.
    pub fn name(&self) -> String {
        self.args
            .first()
            .map(|name| String::from_utf8_lossy(name).to_ascii_uppercase())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Encodes the command into a standalone RESP buffer.
    pub fn get_packed_command(&self) -> Vec<u8> {
        resp::pack_command(&self.args)
    }

    pub(crate) fn write_packed_command(&self, out: &mut Vec<u8>) {
        resp::write_command(out, &self.args);
    }

    pub(crate) fn packed_len(&self) -> usize {
        resp::command_len(&self.args)
    }
}

/// Encodes a batch of commands wrapped in `MULTI`/`EXEC` as one contiguous
/// buffer, so the whole transaction goes out in a single write.
pub(crate) fn pack_transaction<'a>(commands: impl Iterator<Item = &'a Cmd> + Clone) -> Vec<u8> {
    let multi = cmd("MULTI");
    let exec = cmd("EXEC");
    let len: usize = commands.clone().map(Cmd::packed_len).sum::<usize>()
        + multi.packed_len()
        + exec.packed_len();

    let mut out = Vec::with_capacity(len);
    multi.write_packed_command(&mut out);
    for command in commands {
        command.write_packed_command(&mut out);
    }
    exec.write_packed_command(&mut out);
    out
}

/// Conversion of command arguments into their wire byte form.
pub trait ToArg {
    fn to_arg(&self) -> Vec<u8>;
}

impl ToArg for &str {
    fn to_arg(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

impl ToArg for String {
    fn to_arg(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

impl ToArg for &String {
    fn to_arg(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

impl ToArg for &[u8] {
    fn to_arg(&self) -> Vec<u8> {
        self.to_vec()
    }
}

impl ToArg for Vec<u8> {
    fn to_arg(&self) -> Vec<u8> {
        self.clone()
    }
}

macro_rules! itoa_to_arg {
    ($($t:ty),*) => {
        $(impl ToArg for $t {
            fn to_arg(&self) -> Vec<u8> {
                self.to_string().into_bytes()
            }
        })*
    };
}

itoa_to_arg!(i32, i64, u32, u64, usize, f64);
