use std::io;

use httparse;

quick_error! {
    /// Everything that can go wrong while driving a connection.
    ///
    /// None of these ever propagate out of the event loop: they are
    /// absorbed into a status response, a connection close, or the
    /// return value of a registration call.
    #[derive(Debug)]
    pub enum Error {
        Io(err: io::Error) {
            description("I/O error")
            display("I/O error: {}", err)
            from()
        }
        ParseError(err: httparse::Error) {
            description("parse error")
            display("parse error: {:?}", err)
            from()
        }
        ChunkParseError(err: httparse::InvalidChunkSize) {
            description("chunk size parse error")
            from()
        }
        BadRequestTarget {
            description("error parsing request target")
        }
        HostInvalid {
            description("invalid host header")
        }
        ConnectionInvalid {
            description("invalid connection header")
        }
        ContentLengthInvalid {
            description("invalid content-length header")
        }
        DuplicateContentLength {
            description("duplicate content-length header")
        }
        /// `feed()` consumed fewer bytes than were offered outside of a
        /// legal partial parse: the parser is unrecoverable and the
        /// connection must be dropped.
        UnrecoverableParseState {
            description("parser left in an unrecoverable state")
        }
        /// A body source passed to `Responder::write_stream` failed to
        /// produce its first chunk.
        BodySourceUnavailable(err: io::Error) {
            description("body source open/read failure")
            display("body source error: {}", err)
        }
    }
}
