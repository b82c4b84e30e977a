use std::io::{self, Write};

use sink_api::Message;

/// Печать сообщений построчно: `<tag> <time> <record>\n`.
///
/// Flush после каждой строки: вывод смотрят интерактивно, строка должна
/// появиться до прихода следующего сообщения.
pub struct Printer<W: Write> {
    out: W,
    lines: u64,
}

impl<W: Write> Printer<W> {
    pub fn new(out: W) -> Self {
        Self { out, lines: 0 }
    }

    pub fn print(&mut self, msg: &Message) -> io::Result<()> {
        writeln!(self.out, "{msg}")?;
        self.out.flush()?;
        self.lines += 1;
        Ok(())
    }

    /// Сколько строк напечатано.
    pub fn lines(&self) -> u64 {
        self.lines
    }
}
