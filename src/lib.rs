pub mod archive;
pub mod codec;
pub mod container;
pub mod extract;
pub mod ingest;
pub mod merge;
pub mod model;
pub mod package;
pub mod tree;

pub use archive::{ArchiveBuilder, ArchiveError, ArchiveSink, ArchiveSource, ZipSource};
pub use codec::{get_codec, Codec, CodecError, CodecId};
pub use container::{ContainerError, FormatError, RisumContainer};
pub use ingest::{ingest_paths, original_fragments, IngestReport};
pub use merge::{merge, MergeError, MergeOptions, MergeOutcome};
pub use model::{Document, Fragment, FragmentData, Section};
pub use package::{assemble, load_base, BaseArchive, PackageError, PackageOptions, PackageOutput};
