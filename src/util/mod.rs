/*!
Types and routines shared by the interpreter, the capture resolver and the
encoders.
*/

pub mod buffer;
pub mod search;
pub mod wire;
