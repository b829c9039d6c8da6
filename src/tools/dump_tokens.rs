use anyhow::Result;

use minic_rs::lexer::{tokenize, TokenKind};
use minic_rs::SourceFile;

pub fn dump_tokens(source: &SourceFile) -> Result<()> {
    let tokens = tokenize(source)?;
    for tok in &tokens {
        let text = String::from_utf8_lossy(tok.text(source));
        match tok.kind {
            TokenKind::Reserved => {
                println!("{:>6} RESERVED {}", tok.pos, text)
            }
            TokenKind::Ident => println!("{:>6} IDENT    {}", tok.pos, text),
            TokenKind::Num => {
                println!("{:>6} NUM      {} (value {})", tok.pos, text, tok.val)
            }
            TokenKind::Str => println!(
                "{:>6} STR      {} ({} bytes)",
                tok.pos,
                text,
                tok.contents.len()
            ),
            TokenKind::Eof => println!("{:>6} EOF", tok.pos),
        }
    }
    Ok(())
}
