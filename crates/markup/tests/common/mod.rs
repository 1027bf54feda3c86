#![allow(dead_code)]

use std::io::{self, Read};

/// Documents exercising every built-in tag type.
pub const DOCUMENTS: &[(&str, &str)] = &[
    ("simple", r#"<p class="x">Hi <b>there</b></p>"#),
    (
        "page",
        "<!DOCTYPE html><html><!-- c --><body class='a'><% x %>\
         <p>One &amp; two</p></body></html>",
    ),
    (
        "xml",
        "<?xml version=\"1.0\" encoding=\"UTF-8\" ?>\n<?pi data?>\n\
         <root><![CDATA[<not> a tag]]><leaf/></root>",
    ),
    (
        "script",
        "<script>if (a<b && c>d) { x = '</p>'; }</script><p>after &lt; &#60;</p>",
    ),
    (
        "server",
        r#"<a href="<%=url%>" <%-- note --%>>link</a><%-- gone --%>"#,
    ),
    ("unregistered", "<p>a <1x y> b </2> <br>\n</p>"),
    ("declarations", "<!ELEMENT e (#PCDATA)><!ATTLIST e a CDATA '>'><e a='1'>é</e>"),
    ("plain", "no markup at all, just text & an ampersand"),
    ("empty", ""),
];

/// Reader handing out at most `step` bytes per call.
pub struct Trickle<'a> {
    data: &'a [u8],
    step: usize,
}

impl<'a> Trickle<'a> {
    pub fn new(data: &'a str, step: usize) -> Self {
        Self {
            data: data.as_bytes(),
            step,
        }
    }
}

impl Read for Trickle<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.step).min(self.data.len());
        buf[..n].copy_from_slice(&self.data[..n]);
        self.data = &self.data[n..];
        Ok(n)
    }
}

/// Reader that fails once `data` is exhausted.
pub struct FailAtEnd<'a> {
    data: &'a [u8],
}

impl<'a> FailAtEnd<'a> {
    pub fn new(data: &'a str) -> Self {
        Self {
            data: data.as_bytes(),
        }
    }
}

impl Read for FailAtEnd<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.data.is_empty() {
            return Err(io::Error::other("connection reset"));
        }
        let n = buf.len().min(self.data.len());
        buf[..n].copy_from_slice(&self.data[..n]);
        self.data = &self.data[n..];
        Ok(n)
    }
}
